use crate::registry::WorkerRegistry;
use crate::task_queue::TaskQueue;
use crate::types::{TaskPayload, WorkerStatus};
use ritmo_core::{InvocationContext, RitmoError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Pull-based dispatcher bridging the task queue and the worker registry.
///
/// Used for ad hoc task bursts submitted outside the main control loop.
/// Assignment is pull-based: callers invoke [`TaskDispatcher::run_once`]
/// when capacity frees up, which provides natural backpressure without
/// blocking submitters.
pub struct TaskDispatcher {
    queue: Arc<RwLock<TaskQueue>>,
    registry: Arc<RwLock<WorkerRegistry>>,
    invoke_timeout: Duration,
}

impl TaskDispatcher {
    /// Create a dispatcher with the given per-invocation timeout.
    pub fn new(
        queue: Arc<RwLock<TaskQueue>>,
        registry: Arc<RwLock<WorkerRegistry>>,
        invoke_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            invoke_timeout,
        }
    }

    /// Pull assignable tasks up to the queue's remaining capacity and run
    /// each to completion.
    ///
    /// Returns the ids of the tasks that were dispatched this round. A
    /// timed-out invocation is treated exactly like a worker-reported
    /// failure and goes through the queue's retry policy.
    pub async fn run_once(&self) -> Vec<Uuid> {
        let batch = {
            let queue = self.queue.read().await;
            let registry = self.registry.read().await;
            queue.next_assignable(queue.capacity_remaining(), &registry)
        };

        let mut dispatched = Vec::with_capacity(batch.len());
        for task_id in batch {
            if self.dispatch_one(task_id).await {
                dispatched.push(task_id);
            }
        }
        dispatched
    }

    /// Assign, invoke, and settle a single task. Returns `false` when the
    /// task could not be assigned (no matching idle worker remained).
    async fn dispatch_one(&self, task_id: Uuid) -> bool {
        // Assignment phase: pick an idle worker and mark both sides.
        let (worker_name, handler, ctx) = {
            let mut queue = self.queue.write().await;
            let mut registry = self.registry.write().await;

            let Some(task) = queue.get(task_id) else {
                return false;
            };
            let worker = match &task.capability {
                Some(tag) => registry.idle_with_capability(tag),
                None => registry.any_idle(),
            };
            let Some(worker) = worker else {
                return false;
            };
            let worker_name = worker.name.clone();

            let payload = match &task.payload {
                TaskPayload::Opaque(value) => value.clone(),
                other => serde_json::to_value(other).unwrap_or_default(),
            };
            let ctx = InvocationContext::default().with_payload(payload);

            let Some(handler) = registry.handler(&worker_name) else {
                return false;
            };
            if !queue.mark_assigned(task_id, &worker_name) {
                return false;
            }
            queue.mark_in_progress(task_id);
            registry.set_status(&worker_name, WorkerStatus::Running);
            (worker_name, handler, ctx)
        };

        // Invocation phase: no locks held across the worker call.
        let result = tokio::time::timeout(self.invoke_timeout, handler.invoke(ctx))
            .await
            .map_err(|_| RitmoError::WorkerTimeout {
                worker: worker_name.clone(),
                timeout_ms: self.invoke_timeout.as_millis() as u64,
            })
            .and_then(|inner| inner);

        // Settlement phase.
        let mut queue = self.queue.write().await;
        let mut registry = self.registry.write().await;
        match result {
            Ok(outcome) if outcome.success => {
                info!(task_id = %task_id, worker = %worker_name, "Task completed");
                queue.mark_completed(task_id);
                registry.set_status(&worker_name, WorkerStatus::Idle);
                registry.set_last_result(&worker_name, outcome.message);
            }
            Ok(outcome) => {
                warn!(task_id = %task_id, worker = %worker_name, result = %outcome.message, "Task failed");
                queue.mark_failed(task_id, outcome.message.clone());
                registry.set_status(&worker_name, WorkerStatus::Idle);
                registry.set_last_result(&worker_name, outcome.message);
            }
            Err(e) => {
                warn!(task_id = %task_id, worker = %worker_name, error = %e, "Task errored");
                queue.mark_failed(task_id, e.to_string());
                registry.set_status(&worker_name, WorkerStatus::Error);
                registry.set_last_result(&worker_name, e.to_string());
            }
        }
        true
    }
}
