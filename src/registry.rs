//! Task registry: three ordered task collections acting as one state machine.
//!
//! A task id lives in exactly one of {queued, active, completed} at any
//! instant; every move is a single `&mut self` method, so observers behind
//! the registry lock never see a task twice or not at all. Promotion into
//! the active set is the system's sole admission control: `next_to_start`
//! refuses to exceed `max_concurrent`.

use std::collections::VecDeque;

use serde::Serialize;

use crate::task::{DownloadState, DownloadTask, TaskId};

/// Fixed concurrency bound used by `DownloadManager`.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 2;

/// Point-in-time copy of the registry for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queued: Vec<DownloadTask>,
    pub active: Vec<DownloadTask>,
    /// Newest first.
    pub completed: Vec<DownloadTask>,
}

pub struct TaskRegistry {
    max_concurrent: usize,
    queued: VecDeque<DownloadTask>,
    active: Vec<DownloadTask>,
    completed: Vec<DownloadTask>,
}

impl TaskRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            queued: VecDeque::new(),
            active: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Append a task at the tail of the FIFO queue.
    pub fn enqueue(&mut self, task: DownloadTask) {
        debug_assert!(!self.contains(task.id), "task id already registered");
        self.queued.push_back(task);
    }

    /// Promote the queued head to active if a concurrency slot is free.
    /// Returns the promoted task (now `Preparing`) for the supervisor.
    pub fn next_to_start(&mut self) -> Option<DownloadTask> {
        if self.active.len() >= self.max_concurrent {
            return None;
        }
        let mut task = self.queued.pop_front()?;
        task.state = DownloadState::Preparing;
        self.active.push(task.clone());
        Some(task)
    }

    /// Move a queued or active task to completed as `Cancelled`.
    /// No-op (`None`) for completed or unknown ids.
    pub fn cancel(&mut self, id: TaskId) -> Option<DownloadTask> {
        if let Some(pos) = self.active.iter().position(|task| task.id == id) {
            let mut task = self.active.remove(pos);
            task.state = DownloadState::Cancelled;
            self.completed.push(task.clone());
            return Some(task);
        }
        if let Some(pos) = self.queued.iter().position(|task| task.id == id) {
            let mut task = self.queued.remove(pos).expect("position came from iter");
            task.state = DownloadState::Cancelled;
            self.completed.push(task.clone());
            return Some(task);
        }
        None
    }

    /// Re-admit a completed task at the tail of the queue, clearing the
    /// previous run's destination. No-op for ids not in completed.
    pub fn retry(&mut self, id: TaskId) -> Option<DownloadTask> {
        let pos = self.completed.iter().position(|task| task.id == id)?;
        let mut task = self.completed.remove(pos);
        task.state = DownloadState::Queued;
        task.destination_path = None;
        self.queued.push_back(task.clone());
        Some(task)
    }

    /// Move an active task to completed with a terminal state. No-op unless
    /// the id is currently active, which makes late termination callbacks
    /// harmless after a cancel already settled the task.
    pub fn settle(&mut self, id: TaskId, state: DownloadState) -> Option<DownloadTask> {
        debug_assert!(state.is_terminal(), "settle requires a terminal state");
        let pos = self.active.iter().position(|task| task.id == id)?;
        let mut task = self.active.remove(pos);
        task.state = state;
        self.completed.push(task.clone());
        Some(task)
    }

    /// Apply a mutation wherever the task currently lives. Used for
    /// metadata enrichment, which is valid in any state.
    pub fn update(&mut self, id: TaskId, mutation: impl FnOnce(&mut DownloadTask)) -> Option<DownloadTask> {
        let task = self
            .active
            .iter_mut()
            .chain(self.queued.iter_mut())
            .chain(self.completed.iter_mut())
            .find(|task| task.id == id)?;
        mutation(task);
        Some(task.clone())
    }

    /// Apply a mutation only while the task is active. Progress and
    /// destination updates come through here so a late line from a dying
    /// process can never resurrect a terminal task.
    pub fn update_active(&mut self, id: TaskId, mutation: impl FnOnce(&mut DownloadTask)) -> Option<DownloadTask> {
        let task = self.active.iter_mut().find(|task| task.id == id)?;
        mutation(task);
        Some(task.clone())
    }

    pub fn remove_completed(&mut self, id: TaskId) -> bool {
        match self.completed.iter().position(|task| task.id == id) {
            Some(pos) => {
                self.completed.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear_completed(&mut self) {
        self.completed.clear();
    }

    pub fn get(&self, id: TaskId) -> Option<&DownloadTask> {
        self.active
            .iter()
            .chain(self.queued.iter())
            .chain(self.completed.iter())
            .find(|task| task.id == id)
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.active.iter().any(|task| task.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut completed: Vec<DownloadTask> = self.completed.iter().cloned().collect();
        completed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        QueueSnapshot {
            queued: self.queued.iter().cloned().collect(),
            active: self.active.clone(),
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DownloadRequest;
    use std::path::PathBuf;

    fn make_task(n: usize) -> DownloadTask {
        DownloadTask::from_request(&DownloadRequest::new(format!("https://example.com/{n}"), "best"))
    }

    fn membership_count(registry: &TaskRegistry, id: TaskId) -> usize {
        let queued = registry.queued.iter().filter(|t| t.id == id).count();
        let active = registry.active.iter().filter(|t| t.id == id).count();
        let completed = registry.completed.iter().filter(|t| t.id == id).count();
        queued + active + completed
    }

    #[test]
    fn test_enqueue_preserves_fifo_promotion_order() {
        let mut registry = TaskRegistry::new(2);
        let a = make_task(1);
        let b = make_task(2);
        registry.enqueue(a.clone());
        registry.enqueue(b.clone());

        assert_eq!(registry.next_to_start().unwrap().id, a.id);
        assert_eq!(registry.next_to_start().unwrap().id, b.id);
    }

    #[test]
    fn test_promotion_sets_preparing_and_respects_bound() {
        let mut registry = TaskRegistry::new(2);
        for n in 0..3 {
            registry.enqueue(make_task(n));
        }

        let first = registry.next_to_start().unwrap();
        assert_eq!(first.state, DownloadState::Preparing);
        assert!(registry.next_to_start().is_some());

        // Third must wait: both slots are taken.
        assert!(registry.next_to_start().is_none());
        assert_eq!(registry.active_len(), 2);
        assert_eq!(registry.queued_len(), 1);
    }

    #[test]
    fn test_settle_frees_a_slot_for_the_next_task() {
        let mut registry = TaskRegistry::new(1);
        registry.enqueue(make_task(1));
        registry.enqueue(make_task(2));

        let first = registry.next_to_start().unwrap();
        assert!(registry.next_to_start().is_none());

        registry.settle(first.id, DownloadState::Finished { destination: PathBuf::from("/tmp/a.mp4") });
        let second = registry.next_to_start().unwrap();
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_cancel_queued_goes_straight_to_completed() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());

        let cancelled = registry.cancel(task.id).unwrap();
        assert_eq!(cancelled.state, DownloadState::Cancelled);
        assert_eq!(registry.queued_len(), 0);
        assert_eq!(registry.completed_len(), 1);
        assert_eq!(membership_count(&registry, task.id), 1);
    }

    #[test]
    fn test_cancel_active_and_late_settle_is_a_noop() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());
        registry.next_to_start().unwrap();

        registry.cancel(task.id).unwrap();
        assert_eq!(registry.get(task.id).unwrap().state, DownloadState::Cancelled);

        // Late termination callback for the killed process.
        assert!(registry.settle(task.id, DownloadState::Failed { reason: "terminated by signal".into() }).is_none());
        assert_eq!(registry.get(task.id).unwrap().state, DownloadState::Cancelled);
    }

    #[test]
    fn test_cancel_completed_is_a_noop() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());
        registry.next_to_start().unwrap();
        registry.settle(task.id, DownloadState::Failed { reason: "exit 1".into() });

        assert!(registry.cancel(task.id).is_none());
        assert!(matches!(registry.get(task.id).unwrap().state, DownloadState::Failed { .. }));
    }

    #[test]
    fn test_retry_clears_destination_and_requeues_at_tail() {
        let mut registry = TaskRegistry::new(1);
        let failed = make_task(1);
        registry.enqueue(failed.clone());
        registry.next_to_start().unwrap();
        registry.update_active(failed.id, |task| task.destination_path = Some(PathBuf::from("/tmp/partial.mp4")));
        registry.settle(failed.id, DownloadState::Failed { reason: "exit 1".into() });

        let waiting = make_task(2);
        registry.enqueue(waiting.clone());

        let retried = registry.retry(failed.id).unwrap();
        assert_eq!(retried.state, DownloadState::Queued);
        assert!(retried.destination_path.is_none());
        assert_eq!(registry.completed_len(), 0);

        // Tail position: the task queued before the retry is promoted first.
        assert_eq!(registry.next_to_start().unwrap().id, waiting.id);
    }

    #[test]
    fn test_retry_of_non_completed_is_a_noop() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());
        assert!(registry.retry(task.id).is_none());
        assert_eq!(registry.queued_len(), 1);
    }

    #[test]
    fn test_update_active_refuses_terminal_tasks() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());
        registry.next_to_start().unwrap();
        registry.cancel(task.id).unwrap();

        let updated = registry.update_active(task.id, |task| {
            task.state = DownloadState::Downloading { progress: 0.9, eta_seconds: None };
        });
        assert!(updated.is_none());
        assert_eq!(registry.get(task.id).unwrap().state, DownloadState::Cancelled);
    }

    #[test]
    fn test_update_reaches_any_mapping() {
        let mut registry = TaskRegistry::new(2);
        let task = make_task(1);
        registry.enqueue(task.clone());

        registry.update(task.id, |task| task.title = "Resolved Title".into()).unwrap();
        assert_eq!(registry.get(task.id).unwrap().title, "Resolved Title");
    }

    #[test]
    fn test_remove_and_clear_completed() {
        let mut registry = TaskRegistry::new(2);
        let a = make_task(1);
        let b = make_task(2);
        registry.enqueue(a.clone());
        registry.enqueue(b.clone());
        registry.cancel(a.id);
        registry.cancel(b.id);

        assert!(registry.remove_completed(a.id));
        assert!(!registry.remove_completed(a.id));
        assert_eq!(registry.completed_len(), 1);

        registry.clear_completed();
        assert_eq!(registry.completed_len(), 0);
    }

    #[test]
    fn test_snapshot_orders_completed_newest_first() {
        let mut registry = TaskRegistry::new(2);
        let mut old = make_task(1);
        let mut new = make_task(2);
        old.created_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        new.created_at = chrono::Utc::now();
        registry.enqueue(old.clone());
        registry.enqueue(new.clone());
        registry.cancel(old.id);
        registry.cancel(new.id);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.completed[0].id, new.id);
        assert_eq!(snapshot.completed[1].id, old.id);
    }

    // Exactly-one-mapping and admission-control invariants over a
    // pseudo-random operation sequence.
    #[test]
    fn test_invariants_hold_across_random_operations() {
        let mut registry = TaskRegistry::new(2);
        let mut ids: Vec<TaskId> = Vec::new();
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;

        for step in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (seed >> 33) as usize;

            match pick % 6 {
                0 => {
                    let task = make_task(step);
                    ids.push(task.id);
                    registry.enqueue(task);
                }
                1 => {
                    registry.next_to_start();
                }
                2 => {
                    if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                        registry.cancel(id);
                    }
                }
                3 => {
                    if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                        registry.settle(id, DownloadState::Failed { reason: "exit 1".into() });
                    }
                }
                4 => {
                    if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                        registry.settle(id, DownloadState::Finished { destination: PathBuf::from("/tmp/out") });
                    }
                }
                _ => {
                    if let Some(&id) = ids.get(pick % ids.len().max(1)) {
                        registry.retry(id);
                    }
                }
            }

            assert!(registry.active_len() <= 2, "admission control violated at step {step}");
            for &id in &ids {
                let count = membership_count(&registry, id);
                assert!(count <= 1, "task visible in {count} mappings at step {step}");
            }
            for task in &registry.completed {
                assert!(task.state.is_terminal());
            }
            for task in registry.queued.iter().chain(registry.active.iter()) {
                assert!(!task.state.is_terminal());
            }
        }
    }
}
