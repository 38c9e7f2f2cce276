use crate::registry::WorkerRegistry;
use crate::types::{Task, TaskSpec, TaskStatus};
use chrono::Utc;
use ritmo_core::RitmoResult;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Aggregate queue counters surfaced to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    /// Tasks waiting for assignment.
    pub pending: usize,
    /// Tasks assigned or in progress.
    pub in_flight: usize,
    /// Tasks that reached terminal success.
    pub completed: usize,
    /// Tasks that reached terminal failure.
    pub failed: usize,
    /// How many of the failures spent their whole retry budget.
    pub retries_exhausted: usize,
}

/// Priority task queue with retry semantics and an in-flight cap.
///
/// Pending order is dispatch rank first, then admission order (FIFO within
/// a class). Admission is unbounded; concurrency is bounded by
/// [`TaskQueue::capacity_remaining`], which dispatchers consult before
/// pulling work.
pub struct TaskQueue {
    tasks: HashMap<Uuid, Task>,
    /// Admission sequence per live task; retried tasks get a fresh number.
    seq: HashMap<Uuid, u64>,
    next_seq: u64,
    archive: Vec<Task>,
    retries_exhausted: usize,
    max_concurrent: usize,
}

impl TaskQueue {
    /// Create a queue with the given cap on concurrently in-flight tasks.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            seq: HashMap::new(),
            next_seq: 0,
            archive: Vec::new(),
            retries_exhausted: 0,
            max_concurrent,
        }
    }

    /// Admit a task described by an untyped [`TaskSpec`].
    ///
    /// Validates the priority class (fails with
    /// [`ritmo_core::RitmoError::InvalidPriority`] otherwise), inserts in
    /// priority order, and returns immediately without dispatching.
    pub fn submit(&mut self, spec: TaskSpec) -> RitmoResult<Uuid> {
        let priority = crate::types::TaskPriority::from_str(&spec.priority)?;
        let mut task = Task::new(spec.kind, priority).with_payload(spec.payload);
        task.capability = spec.capability;
        if let Some(max) = spec.max_retries {
            task.max_retries = max;
        }
        Ok(self.submit_task(task))
    }

    /// Admit an already-typed task.
    pub fn submit_task(&mut self, task: Task) -> Uuid {
        let id = task.id;
        debug!(task_id = %id, kind = %task.kind, priority = %task.priority, "Task admitted");
        self.seq.insert(id, self.next_seq);
        self.next_seq += 1;
        self.tasks.insert(id, task);
        id
    }

    /// Up to `capacity` pending task ids, highest dispatch rank first and
    /// FIFO within a rank, skipping tasks whose required capability has no
    /// idle worker.
    pub fn next_assignable(&self, capacity: usize, registry: &WorkerRegistry) -> Vec<Uuid> {
        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| match &t.capability {
                Some(tag) => registry.has_idle_with_capability(tag),
                None => true,
            })
            .collect();
        pending.sort_by_key(|t| {
            (
                std::cmp::Reverse(t.priority.rank()),
                self.seq.get(&t.id).copied().unwrap_or(u64::MAX),
            )
        });
        pending.into_iter().take(capacity).map(|t| t.id).collect()
    }

    /// Remaining in-flight capacity under the configured cap.
    pub fn capacity_remaining(&self) -> usize {
        self.max_concurrent.saturating_sub(self.in_flight_count())
    }

    /// Mark a pending task as assigned to a worker.
    pub fn mark_assigned(&mut self, id: Uuid, worker: impl Into<String>) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Assigned;
                task.assigned_to = Some(worker.into());
                true
            }
            _ => false,
        }
    }

    /// Mark an assigned task as in progress.
    pub fn mark_in_progress(&mut self, id: Uuid) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Assigned => {
                task.status = TaskStatus::InProgress;
                true
            }
            _ => false,
        }
    }

    /// Mark a task as completed and archive it.
    pub fn mark_completed(&mut self, id: Uuid) -> bool {
        match self.tasks.remove(&id) {
            Some(mut task) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                self.seq.remove(&id);
                self.archive.push(task);
                true
            }
            None => false,
        }
    }

    /// Mark an in-flight task attempt as failed.
    ///
    /// Only assigned or in-progress tasks can fail; a pending task has no
    /// attempt to charge. Below the retry budget the task returns to
    /// pending with an incremented retry count and unchanged priority,
    /// re-enqueued at the back of its own class. At the budget it goes
    /// terminal and is archived; exhaustion surfaces through
    /// [`TaskQueue::stats`], it is not an error.
    pub fn mark_failed(&mut self, id: Uuid, reason: impl Into<String>) -> bool {
        let retryable = match self.tasks.get(&id) {
            Some(task)
                if matches!(
                    task.status,
                    TaskStatus::Assigned | TaskStatus::InProgress
                ) =>
            {
                task.retry_count < task.max_retries
            }
            _ => return false,
        };
        let reason = reason.into();
        if retryable {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.retry_count += 1;
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                debug!(
                    task_id = %id,
                    retry = task.retry_count,
                    max = task.max_retries,
                    %reason,
                    "Task re-enqueued for retry"
                );
            }
            self.seq.insert(id, self.next_seq);
            self.next_seq += 1;
        } else if let Some(mut task) = self.tasks.remove(&id) {
            // Budget spent: terminal.
            task.status = TaskStatus::Failed { reason };
            task.completed_at = Some(Utc::now());
            self.seq.remove(&id);
            self.retries_exhausted += 1;
            self.archive.push(task);
        }
        true
    }

    /// Get a live or archived task by id.
    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks
            .get(&id)
            .or_else(|| self.archive.iter().find(|t| t.id == id))
    }

    /// Number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Number of assigned or in-progress tasks.
    pub fn in_flight_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress))
            .count()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> QueueStats {
        let completed = self
            .archive
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        QueueStats {
            pending: self.pending_count(),
            in_flight: self.in_flight_count(),
            completed,
            failed: self.archive.len() - completed,
            retries_exhausted: self.retries_exhausted,
        }
    }

    /// All archived (terminal) tasks, oldest first.
    pub fn archived(&self) -> &[Task] {
        &self.archive
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskPriority;
    use async_trait::async_trait;
    use ritmo_core::{
        InvocationContext, InvocationOutcome, RitmoError, RitmoResult, WorkerInvocation,
    };
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl WorkerInvocation for Noop {
        async fn invoke(&self, _ctx: InvocationContext) -> RitmoResult<InvocationOutcome> {
            Ok(InvocationOutcome::success("ok"))
        }
    }

    fn registry_with(names: &[(&str, &str)]) -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        for (name, capability) in names {
            registry.register(*name, *capability, Arc::new(Noop));
        }
        registry
    }

    #[test]
    fn test_submit_validates_priority() {
        let mut queue = TaskQueue::default();
        assert!(queue.submit(TaskSpec::new("t", "high")).is_ok());

        let err = queue.submit(TaskSpec::new("t", "urgent")).unwrap_err();
        assert!(matches!(err, RitmoError::InvalidPriority(_)));
        // The rejected task was not admitted.
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_priority_ordering_high_before_medium() {
        let mut queue = TaskQueue::default();
        let registry = registry_with(&[("w", "any")]);

        let medium = queue.submit(TaskSpec::new("m", "medium")).unwrap();
        let high = queue.submit(TaskSpec::new("h", "high")).unwrap();

        // High submitted after medium is still assigned first.
        assert_eq!(queue.next_assignable(2, &registry), vec![high, medium]);
    }

    #[test]
    fn test_fifo_within_class() {
        let mut queue = TaskQueue::default();
        let registry = registry_with(&[("w", "any")]);

        let first = queue.submit(TaskSpec::new("a", "high")).unwrap();
        let second = queue.submit(TaskSpec::new("b", "high")).unwrap();
        let third = queue.submit(TaskSpec::new("c", "high")).unwrap();

        assert_eq!(
            queue.next_assignable(3, &registry),
            vec![first, second, third]
        );
    }

    #[test]
    fn test_dispatch_order_preserves_low_before_medium() {
        let mut queue = TaskQueue::new(1);
        let registry = registry_with(&[("w", "any")]);

        let low = queue.submit(TaskSpec::new("low", "low")).unwrap();
        let emergency = queue.submit(TaskSpec::new("em", "emergency")).unwrap();
        let medium = queue.submit(TaskSpec::new("med", "medium")).unwrap();

        // With capacity 1, tasks drain one at a time in dispatch-rank order:
        // emergency, then low, then medium.
        let mut order = Vec::new();
        for _ in 0..3 {
            let next = queue.next_assignable(queue.capacity_remaining(), &registry);
            assert_eq!(next.len(), 1);
            let id = next[0];
            queue.mark_assigned(id, "w");
            queue.mark_in_progress(id);
            order.push(id);
            queue.mark_completed(id);
        }
        assert_eq!(order, vec![emergency, low, medium]);
    }

    #[test]
    fn test_next_assignable_skips_missing_capability() {
        let mut queue = TaskQueue::default();
        let mut registry = registry_with(&[("scout", "research")]);

        let needs_sales = queue
            .submit(TaskSpec::new("t1", "high").with_capability("sales"))
            .unwrap();
        let needs_research = queue
            .submit(TaskSpec::new("t2", "low").with_capability("research"))
            .unwrap();

        // No idle sales worker: the higher-priority task is skipped.
        assert_eq!(queue.next_assignable(2, &registry), vec![needs_research]);

        // Busy research worker: nothing assignable.
        registry.set_status("scout", crate::types::WorkerStatus::Running);
        assert!(queue.next_assignable(2, &registry).is_empty());
        let _ = needs_sales;
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        let mut queue = TaskQueue::default();
        let id = queue.submit(TaskSpec::new("t", "medium")).unwrap();

        // Cannot skip ahead.
        assert!(!queue.mark_in_progress(id));
        assert!(queue.mark_assigned(id, "w"));
        // Cannot re-assign an assigned task.
        assert!(!queue.mark_assigned(id, "other"));
        assert!(queue.mark_in_progress(id));
        assert!(queue.mark_completed(id));

        // Terminal tasks accept no further transitions.
        assert!(!queue.mark_failed(id, "late"));
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Completed);
        assert!(queue.get(id).unwrap().completed_at.is_some());
    }

    #[test]
    fn test_mark_failed_requires_an_in_flight_attempt() {
        let mut queue = TaskQueue::default();
        let id = queue.submit(TaskSpec::new("t", "medium")).unwrap();

        // A pending task has no attempt to charge.
        assert!(!queue.mark_failed(id, "never started"));
        let task = queue.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);

        // Assigned attempts can fail.
        queue.mark_assigned(id, "w");
        assert!(queue.mark_failed(id, "lost worker"));
        assert_eq!(queue.get(id).unwrap().retry_count, 1);
    }

    #[test]
    fn test_retry_law_below_budget() {
        let mut queue = TaskQueue::default();
        let registry = registry_with(&[("w", "any")]);
        let id = queue.submit(TaskSpec::new("flaky", "high")).unwrap();
        let later = queue.submit(TaskSpec::new("later", "high")).unwrap();

        queue.mark_assigned(id, "w");
        queue.mark_in_progress(id);
        queue.mark_failed(id, "transient");

        let task = queue.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        // Priority is unchanged by the retry...
        assert_eq!(task.priority, TaskPriority::High);
        assert!(task.assigned_to.is_none());
        // ...but the task re-enters at the back of its class.
        assert_eq!(queue.next_assignable(2, &registry), vec![later, id]);
    }

    #[test]
    fn test_retry_law_exhaustion_is_terminal() {
        let mut queue = TaskQueue::default();
        let registry = registry_with(&[("w", "any")]);
        let id = queue.submit_task(Task::new("doomed", TaskPriority::Medium).with_max_retries(2));

        for _ in 0..2 {
            queue.mark_assigned(id, "w");
            queue.mark_in_progress(id);
            queue.mark_failed(id, "boom");
            assert_eq!(queue.get(id).unwrap().status, TaskStatus::Pending);
        }

        // Third failure spends the budget.
        queue.mark_assigned(id, "w");
        queue.mark_in_progress(id);
        queue.mark_failed(id, "boom");

        let task = queue.get(id).unwrap();
        assert!(matches!(task.status, TaskStatus::Failed { .. }));
        assert!(task.completed_at.is_some());
        // Never re-enqueued.
        assert!(queue.next_assignable(1, &registry).is_empty());
        assert_eq!(queue.stats().retries_exhausted, 1);
    }

    #[test]
    fn test_capacity_remaining_tracks_in_flight() {
        let mut queue = TaskQueue::new(2);
        let a = queue.submit(TaskSpec::new("a", "high")).unwrap();
        let b = queue.submit(TaskSpec::new("b", "high")).unwrap();
        let _c = queue.submit(TaskSpec::new("c", "high")).unwrap();

        assert_eq!(queue.capacity_remaining(), 2);
        queue.mark_assigned(a, "w");
        assert_eq!(queue.capacity_remaining(), 1);
        queue.mark_assigned(b, "w");
        assert_eq!(queue.capacity_remaining(), 0);

        queue.mark_in_progress(a);
        queue.mark_completed(a);
        assert_eq!(queue.capacity_remaining(), 1);
    }

    #[test]
    fn test_stats() {
        let mut queue = TaskQueue::default();
        let done = queue.submit(TaskSpec::new("done", "low")).unwrap();
        let dead = queue.submit_task(Task::new("dead", TaskPriority::Low).with_max_retries(0));
        let _waiting = queue.submit(TaskSpec::new("waiting", "low")).unwrap();

        queue.mark_assigned(done, "w");
        queue.mark_in_progress(done);
        queue.mark_completed(done);

        queue.mark_assigned(dead, "w");
        queue.mark_in_progress(dead);
        queue.mark_failed(dead, "no retries");

        assert_eq!(
            queue.stats(),
            QueueStats {
                pending: 1,
                in_flight: 0,
                completed: 1,
                failed: 1,
                retries_exhausted: 1,
            }
        );
        assert_eq!(queue.archived().len(), 2);
    }
}
