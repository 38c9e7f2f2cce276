use crate::registry::WorkerRegistry;
use crate::types::{Message, MessageKind, Recipient};
use ritmo_core::{InvocationContext, RitmoError, RitmoResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Default number of messages retained in the history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Point-to-point and broadcast message routing between workers.
///
/// A `TaskRequest` to a registered worker invokes the worker's handler under
/// the per-call timeout and synthesizes a `TaskResponse` back to the original
/// sender. Every routed message lands in a bounded most-recent-N history
/// ring; the ring is for observability only and carries no ownership over
/// task state.
pub struct CommunicationBus {
    registry: Arc<RwLock<WorkerRegistry>>,
    history: RwLock<VecDeque<Message>>,
    history_capacity: usize,
    call_timeout: Duration,
}

impl CommunicationBus {
    /// Create a bus over the given registry with a per-call timeout.
    pub fn new(registry: Arc<RwLock<WorkerRegistry>>, call_timeout: Duration) -> Self {
        Self {
            registry,
            history: RwLock::new(VecDeque::new()),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            call_timeout,
        }
    }

    /// Override the history ring capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Route a message synchronously.
    ///
    /// For a [`MessageKind::TaskRequest`] addressed to a registered worker,
    /// the worker's handler runs under the per-call timeout and the reply
    /// comes back as a synthesized [`MessageKind::TaskResponse`] addressed
    /// to the original sender. Other kinds are recorded and delivered
    /// without invoking anything.
    pub async fn send(&self, message: Message) -> RitmoResult<Option<Message>> {
        self.record(message.clone()).await;

        let Recipient::Worker(target) = &message.recipient else {
            return Ok(None);
        };

        if message.kind != MessageKind::TaskRequest {
            // Non-request kinds only need to reach the history ring; the
            // target is not invoked.
            let registered = self.registry.read().await.contains(target);
            if !registered {
                return Err(RitmoError::WorkerNotFound(target.clone()));
            }
            return Ok(None);
        }

        let handler = {
            let registry = self.registry.read().await;
            registry
                .handler(target)
                .ok_or_else(|| RitmoError::WorkerNotFound(target.clone()))?
        };

        let ctx = InvocationContext::default().with_payload(message.payload.clone());
        let outcome = tokio::time::timeout(self.call_timeout, handler.invoke(ctx))
            .await
            .map_err(|_| RitmoError::WorkerTimeout {
                worker: target.clone(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            })??;

        let response = Message::to_worker(
            target.clone(),
            message.sender.clone(),
            MessageKind::TaskResponse,
            serde_json::json!({
                "success": outcome.success,
                "message": outcome.message,
                "next_worker": outcome.next_worker,
                "data": outcome.data,
            }),
        )
        .with_priority(message.priority);

        self.record(response.clone()).await;
        Ok(Some(response))
    }

    /// Fan a message out to each recipient sequentially.
    ///
    /// Delivery is not atomic: recipients that fail are skipped with a
    /// warning and their errors collected, so callers must tolerate partial
    /// delivery.
    pub async fn broadcast(
        &self,
        sender: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
        recipients: &[String],
    ) -> Vec<RitmoError> {
        let sender = sender.into();
        let mut errors = Vec::new();
        for recipient in recipients {
            let message = Message::to_worker(sender.clone(), recipient, kind, payload.clone());
            if let Err(e) = self.send(message).await {
                warn!(recipient = %recipient, error = %e, "Broadcast delivery failed");
                errors.push(e);
            }
        }
        errors
    }

    /// Snapshot of the history ring, oldest first.
    pub async fn history(&self) -> Vec<Message> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Number of messages currently retained.
    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    async fn record(&self, message: Message) {
        let mut history = self.history.write().await;
        while history.len() >= self.history_capacity.max(1) {
            history.pop_front();
        }
        history.push_back(message);
    }
}
