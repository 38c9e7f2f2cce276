use crate::RitmoResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The context handed to a worker for one invocation.
///
/// Carries the current cycle number, the active goal text (if any), and the
/// output of a prior worker when the invocation is part of a hand-off. The
/// `payload` field is opaque to the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationContext {
    /// Control-loop cycle number at the time of dispatch (0 for ad hoc calls).
    pub cycle: u64,
    /// The active goal or sub-goal text, when one is configured.
    pub goal: Option<String>,
    /// Output of the preceding worker, set only for hand-off invocations.
    pub prior_output: Option<String>,
    /// Opaque task payload; the scheduler never interprets its contents.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl InvocationContext {
    /// Create a context for the given cycle with no goal or payload.
    pub fn for_cycle(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    /// Attach a goal to this context.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Attach a prior worker's output, marking this as a hand-off context.
    pub fn with_prior_output(mut self, output: impl Into<String>) -> Self {
        self.prior_output = Some(output.into());
        self
    }

    /// Attach an opaque payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// What a worker reports back after a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Whether the invocation succeeded from the worker's point of view.
    pub success: bool,
    /// Human-readable result text.
    pub message: String,
    /// Name of a follow-up worker, when the worker requests a hand-off.
    #[serde(default)]
    pub next_worker: Option<String>,
    /// Structured side channel for supervisory signals
    /// (e.g. `{"errors_detected": 2}` or `{"success_rate": 0.9}`).
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InvocationOutcome {
    /// A successful outcome with the given result text.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            next_worker: None,
            data: serde_json::Value::Null,
        }
    }

    /// A failed outcome with the given result text.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            next_worker: None,
            data: serde_json::Value::Null,
        }
    }

    /// Request a hand-off to the named worker.
    pub fn with_next_worker(mut self, name: impl Into<String>) -> Self {
        self.next_worker = Some(name.into());
        self
    }

    /// Attach structured signal data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// The invocation interface implemented by every registered worker.
///
/// Callers always race `invoke` against an enforced timeout; implementations
/// must therefore be cancel-safe at their await points.
#[async_trait]
pub trait WorkerInvocation: Send + Sync {
    /// Execute one unit of work and report the outcome.
    async fn invoke(&self, ctx: InvocationContext) -> RitmoResult<InvocationOutcome>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl WorkerInvocation for Echo {
        async fn invoke(&self, ctx: InvocationContext) -> RitmoResult<InvocationOutcome> {
            Ok(InvocationOutcome::success(format!("cycle {}", ctx.cycle)))
        }
    }

    #[tokio::test]
    async fn test_invoke_through_trait_object() {
        let worker: std::sync::Arc<dyn WorkerInvocation> = std::sync::Arc::new(Echo);
        let outcome = worker
            .invoke(InvocationContext::for_cycle(7))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "cycle 7");
        assert!(outcome.next_worker.is_none());
    }

    #[test]
    fn test_context_builders() {
        let ctx = InvocationContext::for_cycle(3)
            .with_goal("research competitors")
            .with_prior_output("draft ready")
            .with_payload(serde_json::json!({"lead": "acme"}));
        assert_eq!(ctx.cycle, 3);
        assert_eq!(ctx.goal.as_deref(), Some("research competitors"));
        assert_eq!(ctx.prior_output.as_deref(), Some("draft ready"));
        assert_eq!(ctx.payload["lead"], "acme");
    }

    #[test]
    fn test_outcome_builders() {
        let outcome = InvocationOutcome::success("done")
            .with_next_worker("writer")
            .with_data(serde_json::json!({"success_rate": 0.9}));
        assert!(outcome.success);
        assert_eq!(outcome.next_worker.as_deref(), Some("writer"));
        assert_eq!(outcome.data["success_rate"], 0.9);

        let failed = InvocationOutcome::failure("upstream 503");
        assert!(!failed.success);
    }

    #[test]
    fn test_outcome_deserialization_defaults() {
        // Older workers omit next_worker and data entirely.
        let json = r#"{"success": true, "message": "ok"}"#;
        let outcome: InvocationOutcome = serde_json::from_str(json).unwrap();
        assert!(outcome.next_worker.is_none());
        assert!(outcome.data.is_null());
    }
}
