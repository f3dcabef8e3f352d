//! Download orchestration: the public facade and the scheduler pump.
//!
//! All registry mutations funnel through one mutex (the coordination
//! context); events are published while it is held, so subscribers see
//! mutations in application order. Process spawning and output streaming
//! happen on worker tasks and marshal their writes back through the same
//! mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tokio::sync::{broadcast, Notify};

use crate::error::DownloaderError;
use crate::events::{DownloadEvent, EVENT_CHANNEL_CAPACITY};
use crate::formats::{parse_format_table, FormatDescriptor};
use crate::media_info;
use crate::notify::Notifier;
use crate::registry::{QueueSnapshot, TaskRegistry, MAX_CONCURRENT_DOWNLOADS};
use crate::settings::Preferences;
use crate::subprocess::{self, ProcessHandle};
use crate::task::{DownloadRequest, DownloadState, DownloadTask, TaskId};
use crate::toolchain::ToolchainResolver;
use crate::ytdlp;

/// Shared state behind every `DownloadManager` clone.
pub(crate) struct ManagerInner {
    pub(crate) registry: Mutex<TaskRegistry>,
    pub(crate) events: broadcast::Sender<DownloadEvent>,
    pub(crate) preferences: Arc<dyn Preferences>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) toolchain: ToolchainResolver,
    pub(crate) handles: Mutex<HashMap<TaskId, ProcessHandle>>,
    pub(crate) queue_notify: Notify,
}

impl ManagerInner {
    /// Send an event; a send error only means there are no subscribers.
    pub(crate) fn publish(&self, event: DownloadEvent) {
        let _ = self.events.send(event);
    }

    /// Wake the scheduler pump. Call after every mutation that changes the
    /// size of the queued or active sets.
    pub(crate) fn signal_scheduler(&self) {
        self.queue_notify.notify_one();
    }
}

/// Move an active task to completed with a terminal state computed from
/// its current value, publish the matching event, and fire the
/// notification collaborator. No-op when the task is no longer active
/// (e.g. a cancel settled it first).
pub(crate) fn settle_active(
    inner: &Arc<ManagerInner>,
    id: TaskId,
    make_state: impl FnOnce(&DownloadTask) -> DownloadState,
) -> Option<DownloadTask> {
    let settled = {
        let mut registry = inner.registry.lock().unwrap();
        if !registry.is_active(id) {
            return None;
        }
        let state = make_state(registry.get(id).expect("active task present"));
        let task = registry.settle(id, state)?;
        let event = match &task.state {
            DownloadState::Finished { .. } => DownloadEvent::Finished { task: task.clone() },
            DownloadState::Failed { reason } => DownloadEvent::Failed { task: task.clone(), reason: reason.clone() },
            _ => DownloadEvent::Cancelled { task: task.clone() },
        };
        inner.publish(event);
        task
    };

    match &settled.state {
        DownloadState::Finished { .. } => inner.notifier.notify_completion(&settled),
        DownloadState::Failed { reason } => inner.notifier.notify_failure(&settled, reason),
        _ => {}
    }
    Some(settled)
}

/// Cloneable handle over the orchestration core.
///
/// Construct inside a Tokio runtime; the scheduler pump is spawned at
/// construction and runs for the manager's lifetime.
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl Clone for DownloadManager {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl DownloadManager {
    pub fn new(preferences: Arc<dyn Preferences>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_toolchain(preferences, notifier, ToolchainResolver::new())
    }

    /// Constructor with an explicit toolchain resolver (tests point it at
    /// scratch directories).
    pub fn with_toolchain(
        preferences: Arc<dyn Preferences>,
        notifier: Arc<dyn Notifier>,
        toolchain: ToolchainResolver,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(ManagerInner {
            registry: Mutex::new(TaskRegistry::new(MAX_CONCURRENT_DOWNLOADS)),
            events,
            preferences,
            notifier,
            toolchain,
            handles: Mutex::new(HashMap::new()),
            queue_notify: Notify::new(),
        });

        tokio::spawn(run_queue_pump(inner.clone()));

        Self { inner }
    }

    /// Create a queued task, fire its metadata prefetch, and wake the
    /// scheduler. Returns the task as enqueued.
    pub fn enqueue(&self, request: DownloadRequest) -> DownloadTask {
        let task = DownloadTask::from_request(&request);
        {
            let mut registry = self.inner.registry.lock().unwrap();
            registry.enqueue(task.clone());
            self.inner.publish(DownloadEvent::Queued { task: task.clone() });
        }
        log::info!("enqueued download: {}", task.source_url);

        media_info::spawn_prefetch(self.inner.clone(), task.id, task.source_url.clone());
        self.inner.signal_scheduler();
        task
    }

    /// Enqueue with the current preference's default format selector.
    pub fn enqueue_url(&self, url: impl Into<String>) -> DownloadTask {
        let preference = self.inner.preferences.configuration().format_preference;
        let request = DownloadRequest::new(url, preference.format_selector()).with_media_kind(preference.media_kind());
        self.enqueue(request)
    }

    /// Cancel a task. Active: the tracked process is terminated and the
    /// task settles as `Cancelled`. Queued: moved straight to completed.
    /// Completed or unknown: no-op. Always wakes the scheduler (a
    /// cancelled active task frees a slot).
    pub fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.inner.handles.lock().unwrap().remove(&id) {
            handle.terminate();
        }
        {
            let mut registry = self.inner.registry.lock().unwrap();
            if let Some(task) = registry.cancel(id) {
                log::info!("cancelled download: {}", task.source_url);
                self.inner.publish(DownloadEvent::Cancelled { task });
            }
        }
        self.inner.signal_scheduler();
    }

    /// Re-admit a completed task at the tail of the queue. No-op unless the
    /// id is in completed.
    pub fn retry(&self, id: TaskId) {
        {
            let mut registry = self.inner.registry.lock().unwrap();
            if let Some(task) = registry.retry(id) {
                self.inner.publish(DownloadEvent::Queued { task });
            }
        }
        self.inner.signal_scheduler();
    }

    /// Drop one task from history. No effect on other tasks.
    pub fn remove_completed(&self, id: TaskId) {
        let mut registry = self.inner.registry.lock().unwrap();
        if registry.remove_completed(id) {
            self.inner.publish(DownloadEvent::Removed { id });
        }
    }

    /// Drop the whole history. No effect on queued or active tasks.
    pub fn clear_completed(&self) {
        let mut registry = self.inner.registry.lock().unwrap();
        registry.clear_completed();
        self.inner.publish(DownloadEvent::HistoryCleared);
    }

    /// Point-in-time copy of the three task lists.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.registry.lock().unwrap().snapshot()
    }

    /// Ordered feed of registry mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// Query the selectable formats for a URL (`--list-formats`).
    pub async fn list_formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, DownloaderError> {
        let toolchain = self.inner.toolchain.resolve()?;

        let mut cmd = Command::new(&toolchain.ytdlp);
        cmd.arg("--list-formats").arg(url);

        let (output, errors, status) = ytdlp::run(&mut cmd)
            .await
            .map_err(|err| DownloaderError::format_list(url, err.to_string()))?;

        let formats = parse_format_table(&output);
        if formats.is_empty() && !status.success() {
            let reason = errors
                .lines()
                .find(|line| !line.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("downloader {}", ytdlp::exit_status_note(status)));
            return Err(DownloaderError::format_list(url, reason));
        }
        Ok(formats)
    }
}

/// Scheduler pump: waits for a wake-up, then promotes queued tasks until
/// capacity or the queue is exhausted. The only place tasks enter the
/// active set.
async fn run_queue_pump(inner: Arc<ManagerInner>) {
    log::debug!("download queue pump running");
    loop {
        inner.queue_notify.notified().await;

        loop {
            let next = {
                let mut registry = inner.registry.lock().unwrap();
                let next = registry.next_to_start();
                if let Some(task) = &next {
                    inner.publish(DownloadEvent::Started { task: task.clone() });
                }
                next
            };

            let Some(task) = next else { break };
            subprocess::execute_download(inner.clone(), task);
        }
    }
}
