use crate::types::{Worker, WorkerStatus, MAX_WORKER_PRIORITY, MIN_WORKER_PRIORITY};
use ritmo_core::WorkerInvocation;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Holds the fixed set of named workers and their invocation handlers.
///
/// Workers are established at startup and never destroyed during a run;
/// status and priority are mutated only by the controller after each
/// invocation.
pub struct WorkerRegistry {
    workers: HashMap<String, Worker>,
    handlers: HashMap<String, Arc<dyn WorkerInvocation>>,
    /// Registration order, so listings are stable for callers.
    order: Vec<String>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
            handlers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a worker with its capability tag and invocation handler.
    ///
    /// Registering a duplicate name is an idempotent no-op: the original
    /// entry keeps its capability tag and handler.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        capability: impl Into<String>,
        handler: Arc<dyn WorkerInvocation>,
    ) {
        let name = name.into();
        if self.workers.contains_key(&name) {
            warn!(worker = %name, "Duplicate worker registration ignored");
            return;
        }
        self.workers
            .insert(name.clone(), Worker::new(name.clone(), capability));
        self.handlers.insert(name.clone(), handler);
        self.order.push(name);
    }

    /// Get a worker by name.
    pub fn get(&self, name: &str) -> Option<&Worker> {
        self.workers.get(name)
    }

    /// True when a worker with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Get the invocation handler for a worker.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn WorkerInvocation>> {
        self.handlers.get(name).cloned()
    }

    /// All workers with the given capability tag, in registration order.
    pub fn list_by_capability(&self, tag: &str) -> Vec<&Worker> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .filter(|w| w.capability == tag)
            .collect()
    }

    /// All workers, in registration order.
    pub fn all(&self) -> Vec<&Worker> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .collect()
    }

    /// All worker names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Set a worker's status. Unknown names are ignored.
    pub fn set_status(&mut self, name: &str, status: WorkerStatus) {
        if let Some(worker) = self.workers.get_mut(name) {
            worker.status = status;
        }
    }

    /// Record a worker's last observed result text. Unknown names are ignored.
    pub fn set_last_result(&mut self, name: &str, result: impl Into<String>) {
        if let Some(worker) = self.workers.get_mut(name) {
            worker.last_result = Some(result.into());
        }
    }

    /// Adjust a worker's priority weight by `delta`, clamped to 1..=5.
    ///
    /// Returns the new weight, or `None` for unknown names.
    pub fn adjust_priority(&mut self, name: &str, delta: i8) -> Option<u8> {
        let worker = self.workers.get_mut(name)?;
        let adjusted = (i16::from(worker.priority) + i16::from(delta))
            .clamp(i16::from(MIN_WORKER_PRIORITY), i16::from(MAX_WORKER_PRIORITY));
        worker.priority = adjusted as u8;
        Some(worker.priority)
    }

    /// True when at least one idle worker carries the given capability tag.
    pub fn has_idle_with_capability(&self, tag: &str) -> bool {
        self.workers
            .values()
            .any(|w| w.capability == tag && w.status == WorkerStatus::Idle)
    }

    /// The first idle worker with the given capability, in registration order.
    pub fn idle_with_capability(&self, tag: &str) -> Option<&Worker> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .find(|w| w.capability == tag && w.status == WorkerStatus::Idle)
    }

    /// The first idle worker regardless of capability, in registration order.
    pub fn any_idle(&self) -> Option<&Worker> {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .find(|w| w.status == WorkerStatus::Idle)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ritmo_core::{InvocationContext, InvocationOutcome, RitmoResult};

    struct Noop;

    #[async_trait]
    impl WorkerInvocation for Noop {
        async fn invoke(&self, _ctx: InvocationContext) -> RitmoResult<InvocationOutcome> {
            Ok(InvocationOutcome::success("ok"))
        }
    }

    fn handler() -> Arc<dyn WorkerInvocation> {
        Arc::new(Noop)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());

        assert_eq!(registry.len(), 1);
        let worker = registry.get("scout").unwrap();
        assert_eq!(worker.capability, "research");
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert!(registry.handler("scout").is_some());
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());
        registry.register("scout", "outreach", handler());

        assert_eq!(registry.len(), 1);
        // Original capability tag survives.
        assert_eq!(registry.get("scout").unwrap().capability, "research");
    }

    #[test]
    fn test_list_by_capability() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());
        registry.register("analyst", "research", handler());
        registry.register("writer", "outreach", handler());

        let researchers = registry.list_by_capability("research");
        assert_eq!(researchers.len(), 2);
        assert_eq!(researchers[0].name, "scout");
        assert_eq!(researchers[1].name, "analyst");
        assert!(registry.list_by_capability("sales").is_empty());
    }

    #[test]
    fn test_set_status_and_idle_lookup() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());
        registry.register("analyst", "research", handler());

        assert!(registry.has_idle_with_capability("research"));
        registry.set_status("scout", WorkerStatus::Running);
        assert_eq!(
            registry.idle_with_capability("research").unwrap().name,
            "analyst"
        );

        registry.set_status("analyst", WorkerStatus::Error);
        assert!(!registry.has_idle_with_capability("research"));
        assert!(registry.any_idle().is_none());
    }

    #[test]
    fn test_adjust_priority_clamps() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());

        // Starts at 3; +1 twice caps at 5.
        assert_eq!(registry.adjust_priority("scout", 1), Some(4));
        assert_eq!(registry.adjust_priority("scout", 1), Some(5));
        assert_eq!(registry.adjust_priority("scout", 1), Some(5));

        // -2 repeatedly floors at 1.
        assert_eq!(registry.adjust_priority("scout", -2), Some(3));
        assert_eq!(registry.adjust_priority("scout", -2), Some(1));
        assert_eq!(registry.adjust_priority("scout", -2), Some(1));

        assert_eq!(registry.adjust_priority("ghost", 1), None);
    }

    #[test]
    fn test_last_result() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());
        registry.set_last_result("scout", "found 3 leads");
        assert_eq!(
            registry.get("scout").unwrap().last_result.as_deref(),
            Some("found 3 leads")
        );
    }

    #[test]
    fn test_names_in_registration_order() {
        let mut registry = WorkerRegistry::new();
        registry.register("scout", "research", handler());
        registry.register("writer", "outreach", handler());
        registry.register("analyst", "analysis", handler());
        assert_eq!(registry.names(), vec!["scout", "writer", "analyst"]);
    }
}
