//! Task model: the unit of work and its lifecycle state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier joining a task across the registry and the process table.
pub type TaskId = Uuid;

/// Whether a task fetches full media or audio streams only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Derive the kind from a format selector. Selectors requesting audio
    /// streams mention "audio" ("bestaudio/best", "bestaudio[ext=m4a]", ...).
    pub fn infer_from_selector(selector: &str) -> Self {
        if selector.contains("audio") { MediaKind::Audio } else { MediaKind::Video }
    }
}

/// Lifecycle state of a download task.
///
/// Non-terminal states only occur while the task lives in the queued or
/// active registry; the terminal states only in completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DownloadState {
    Queued,
    Preparing,
    Downloading { progress: f64, eta_seconds: Option<u64> },
    Finished { destination: PathBuf },
    Failed { reason: String },
    Cancelled,
}

impl DownloadState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Finished { .. } | DownloadState::Failed { .. } | DownloadState::Cancelled)
    }

    /// Display fraction in [0, 1].
    pub fn progress(&self) -> f64 {
        match self {
            DownloadState::Downloading { progress, .. } => *progress,
            DownloadState::Finished { .. } => 1.0,
            _ => 0.0,
        }
    }
}

/// Input for enqueueing a download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format: String,
    pub media_kind: MediaKind,
    pub custom_title: Option<String>,
}

impl DownloadRequest {
    /// Request with the media kind inferred from the format selector.
    pub fn new(url: impl Into<String>, format: impl Into<String>) -> Self {
        let format = format.into();
        let media_kind = MediaKind::infer_from_selector(&format);
        Self { url: url.into(), format, media_kind, custom_title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.custom_title = Some(title.into());
        self
    }

    pub fn with_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }
}

/// One user-requested media fetch and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub id: TaskId,
    pub source_url: String,
    /// Display title; starts as the URL (or a caller-supplied title) and is
    /// overwritten when metadata prefetch succeeds.
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: DownloadState,
    /// Passed verbatim to the downloader's `-f` flag.
    pub format_selector: String,
    pub media_kind: MediaKind,
    /// Where the downloader reported it is writing output.
    pub destination_path: Option<PathBuf>,
}

impl DownloadTask {
    pub fn from_request(request: &DownloadRequest) -> Self {
        let title = request.custom_title.clone().unwrap_or_else(|| request.url.clone());
        Self {
            id: Uuid::new_v4(),
            source_url: request.url.clone(),
            title,
            thumbnail_url: None,
            created_at: Utc::now(),
            state: DownloadState::Queued,
            format_selector: request.format.clone(),
            media_kind: request.media_kind,
            destination_path: None,
        }
    }
}
