//! Best-effort metadata prefetch from the downloader's JSON output.
//!
//! Runs concurrently with scheduling and never blocks or fails the
//! download itself: every failure mode (spawn error, nonzero exit,
//! unparseable output, missing fields) leaves the task with its fallback
//! title and no thumbnail. Never retried.

use std::sync::Arc;

use serde_json::Value;
use tokio::process::Command;

use crate::events::DownloadEvent;
use crate::manager::ManagerInner;
use crate::task::TaskId;
use crate::ytdlp;

/// Title/thumbnail pair extracted from a metadata query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractedMediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Fire the prefetch worker for a freshly enqueued task.
pub(crate) fn spawn_prefetch(inner: Arc<ManagerInner>, id: TaskId, url: String) {
    tokio::spawn(async move {
        let Ok(toolchain) = inner.toolchain.resolve() else {
            return;
        };

        let mut cmd = Command::new(&toolchain.ytdlp);
        cmd.arg("--skip-download").arg("--print-json").arg(&url);

        let (output, _errors, status) = match ytdlp::run(&mut cmd).await {
            Ok(result) => result,
            Err(err) => {
                log::debug!("metadata fetch failed to start for {}: {}", url, err);
                return;
            }
        };
        if !status.success() {
            return;
        }

        let Some(info) = extract_media_info(&output) else {
            return;
        };

        let mut registry = inner.registry.lock().unwrap();
        let updated = registry.update(id, |task| {
            if let Some(title) = &info.title {
                task.title = title.clone();
            }
            task.thumbnail_url = info.thumbnail.clone();
        });
        if let Some(task) = updated {
            inner.publish(DownloadEvent::MediaInfoUpdated {
                id,
                title: task.title,
                thumbnail_url: task.thumbnail_url,
            });
        }
    });
}

/// Pull `title` and `thumbnail` out of the first JSON document in the
/// output. Tolerant of missing or null fields; a missing thumbnail falls
/// back to the last entry of the `thumbnails` array.
pub(crate) fn extract_media_info(output: &str) -> Option<ExtractedMediaInfo> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let v: Value = serde_json::from_str(line).ok()?;

    let title = v
        .get("title")
        .and_then(|t| t.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let thumbnail = v
        .get("thumbnail")
        .and_then(|t| t.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            v.get("thumbnails")
                .and_then(|arr| arr.as_array())
                .and_then(|thumbnails| thumbnails.last())
                .and_then(|thumb| thumb.get("url"))
                .and_then(|url| url.as_str())
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string);

    Some(ExtractedMediaInfo { title, thumbnail })
}
