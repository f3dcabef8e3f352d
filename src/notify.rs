//! Notification collaborator: told about terminal outcomes, never awaited.

use crate::task::DownloadTask;

/// Receives fire-and-forget terminal notifications. Implementations bridge
/// to desktop notification centers, tray icons, etc.; the core neither
/// awaits nor reacts to their outcome. Cancellations are not announced.
pub trait Notifier: Send + Sync {
    fn notify_completion(&self, task: &DownloadTask);
    fn notify_failure(&self, task: &DownloadTask, reason: &str);
}

/// Default notifier that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_completion(&self, task: &DownloadTask) {
        log::info!("download complete: {} ({})", task.title, task.source_url);
    }

    fn notify_failure(&self, task: &DownloadTask, reason: &str) {
        log::warn!("download failed: {} ({}): {}", task.title, task.source_url, reason);
    }
}
