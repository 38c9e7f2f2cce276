//! Adaptive multi-agent task scheduler.
//!
//! A cooperative control loop that selects among a pool of named workers,
//! dispatches bounded-concurrency tasks with priority and retry semantics,
//! detects and recovers from repeated failures, adapts its own cadence to
//! observed error and success rates, and coordinates hand-offs between
//! workers.
//!
//! # Main types
//!
//! - [`LoopController`] — Top-level adaptive control loop and state machine.
//! - [`WorkerRegistry`] — The fixed set of named, capability-tagged workers.
//! - [`TaskQueue`] — Priority queue with retry semantics and an in-flight cap.
//! - [`TaskDispatcher`] — Pull-based dispatcher for ad hoc task bursts.
//! - [`CommunicationBus`] — Point-to-point and broadcast routing with history.
//! - [`LoopMetrics`] — Cumulative counters exposed to observers.

/// Point-to-point and broadcast message routing.
pub mod bus;
/// The adaptive control loop.
pub mod controller;
/// Pull-based task dispatch.
pub mod dispatcher;
/// Background JSONL journal and tracing-backed status sink.
pub mod journal;
/// Loop metrics and their persistence.
pub mod metrics;
/// Worker registry.
pub mod registry;
/// Priority task queue.
pub mod task_queue;
/// Shared scheduler types (Worker, Task, Message, etc.).
pub mod types;

pub use bus::CommunicationBus;
pub use controller::{ControllerConfig, ControllerState, LoopController, MetricsSnapshot};
pub use dispatcher::TaskDispatcher;
pub use journal::{FileJournal, TracingStatus};
pub use metrics::{FileMetricsStore, LoopMetrics, MetricsStore, NullMetricsStore};
pub use registry::WorkerRegistry;
pub use task_queue::{QueueStats, TaskQueue};
pub use types::{
    Message, MessageKind, Recipient, Task, TaskPayload, TaskPriority, TaskSpec, TaskStatus,
    Worker, WorkerStatus,
};
