//! Registry change events published to subscribers.
//!
//! Events are sent over a `tokio::sync::broadcast` channel while the
//! registry lock is held, so subscribers observe every mutation in the
//! order it was applied. A receiver that falls behind the channel capacity
//! drops the oldest events (broadcast semantics); `DownloadManager::snapshot`
//! is the catch-up path.

use std::path::PathBuf;

use serde::Serialize;

use crate::task::{DownloadTask, TaskId};

/// Capacity of the broadcast channel behind `DownloadManager::subscribe`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One registry mutation, in application order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum DownloadEvent {
    /// A task entered the queue (fresh enqueue or retry).
    #[serde(rename = "download-queued")]
    Queued { task: DownloadTask },

    /// A task was promoted from queued to active.
    #[serde(rename = "download-started")]
    Started { task: DownloadTask },

    #[serde(rename = "download-progress")]
    Progress { id: TaskId, progress: f64, eta_seconds: Option<u64> },

    /// Metadata prefetch enriched the task's title/thumbnail.
    #[serde(rename = "update-media-info")]
    MediaInfoUpdated { id: TaskId, title: String, thumbnail_url: Option<String> },

    /// The downloader announced where it is writing output.
    #[serde(rename = "download-destination")]
    Destination { id: TaskId, path: PathBuf },

    #[serde(rename = "download-complete")]
    Finished { task: DownloadTask },

    #[serde(rename = "download-error")]
    Failed { task: DownloadTask, reason: String },

    #[serde(rename = "download-cancelled")]
    Cancelled { task: DownloadTask },

    /// A completed task was removed from history.
    #[serde(rename = "download-removed")]
    Removed { id: TaskId },

    #[serde(rename = "history-cleared")]
    HistoryCleared,
}
