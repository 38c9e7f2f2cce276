use crate::bus::CommunicationBus;
use crate::metrics::{LoopMetrics, MetricsStore, NullMetricsStore};
use crate::registry::WorkerRegistry;
use crate::types::{Message, MessageKind, WorkerStatus};
use chrono::Utc;
use ritmo_core::{
    InvocationContext, InvocationOutcome, LogEntry, LogSink, NullLog, NullStatus, RitmoError,
    RitmoResult, StatusSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the loop controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Not started.
    Idle,
    /// Normal cadence.
    Running,
    /// Degraded cadence and conservative worker selection.
    RecoveryMode,
    /// Terminal; resumable only by a fresh start.
    Stopped,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Running => write!(f, "running"),
            ControllerState::RecoveryMode => write!(f, "recovery_mode"),
            ControllerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Tuning knobs for the adaptive control loop.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ControllerConfig {
    /// Baseline cycle period.
    pub base_period: Duration,
    /// Floor for adaptive speed-up.
    pub min_period: Duration,
    /// Cap for adaptive slow-down.
    pub max_period: Duration,
    /// Multiplier applied when slowing down (> 1).
    pub slowdown_factor: f64,
    /// Multiplier applied when speeding up (< 1).
    pub speedup_factor: f64,
    /// Multiplier relaxing the period back toward baseline (< 1).
    pub relax_factor: f64,
    /// Run the supervisory health check every Nth cycle; 0 disables it.
    pub health_check_every: u64,
    /// Run the meta-analysis every Mth cycle; 0 disables it.
    pub meta_analysis_every: u64,
    /// Run the collaboration round every Kth cycle; 0 disables it.
    pub collaboration_every: u64,
    /// Enforced bound on every worker invocation.
    pub invoke_timeout: Duration,
    /// Consecutive failures that force recovery mode.
    pub consecutive_error_threshold: u32,
    /// Minimum priority weight considered stable in recovery mode.
    pub stability_threshold: u8,
    /// Minimum interval between coordinated hand-offs.
    pub handoff_min_interval: Duration,
    /// Success rate above which the loop speeds up.
    pub success_high_water: f64,
    /// Success rate below which the loop slows down.
    pub success_low_water: f64,
    /// Stop after this many cycles, when set.
    pub max_cycles: Option<u64>,
    /// Active goal text used for goal-driven selection.
    pub goal: Option<String>,
    /// Designated supervisory worker for the health check.
    pub supervisor: Option<String>,
    /// Designated analysis worker for the success-rate signal.
    pub analyst: Option<String>,
    /// Designated collaboration worker for periodic coordination rounds.
    pub collaborator: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_period: Duration::from_millis(1000),
            min_period: Duration::from_millis(250),
            max_period: Duration::from_millis(10_000),
            slowdown_factor: 1.5,
            speedup_factor: 0.9,
            relax_factor: 0.9,
            health_check_every: 5,
            meta_analysis_every: 10,
            collaboration_every: 15,
            invoke_timeout: Duration::from_secs(10),
            consecutive_error_threshold: 3,
            stability_threshold: 3,
            handoff_min_interval: Duration::from_secs(5),
            success_high_water: 0.85,
            success_low_water: 0.60,
            max_cycles: None,
            goal: None,
            supervisor: None,
            analyst: None,
            collaborator: None,
        }
    }
}

/// Snapshot exposed through [`LoopController::metrics`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Cumulative counters and runtime flags.
    #[serde(flatten)]
    pub metrics: LoopMetrics,
    /// Current lifecycle state.
    pub state: ControllerState,
}

/// The top-level adaptive control loop.
///
/// On a timer, picks a worker (weighted or goal-driven), invokes it under a
/// bounded timeout, interprets the outcome, updates priorities, coordinates
/// hand-offs and periodic collaboration/health cycles, and adapts its own
/// period. Cycles are strictly sequential: the next timer tick is armed only
/// after the current cycle's async work settles.
///
/// Any error inside a cycle is absorbed at the cycle boundary, counted, and
/// answered with recovery mode. The loop never dies, it only slows down.
pub struct LoopController {
    config: ControllerConfig,
    registry: Arc<RwLock<WorkerRegistry>>,
    bus: Arc<CommunicationBus>,
    metrics: Arc<RwLock<LoopMetrics>>,
    state: Arc<RwLock<ControllerState>>,
    log: Arc<dyn LogSink>,
    status: Arc<dyn StatusSink>,
    store: Arc<dyn MetricsStore>,
    shutdown: watch::Sender<bool>,
}

impl LoopController {
    /// Create a controller over the given registry.
    pub fn new(registry: Arc<RwLock<WorkerRegistry>>, config: ControllerConfig) -> Self {
        let bus = Arc::new(CommunicationBus::new(
            registry.clone(),
            config.invoke_timeout,
        ));
        let metrics = LoopMetrics {
            period_ms: config.base_period.as_millis() as u64,
            ..LoopMetrics::default()
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            registry,
            bus,
            metrics: Arc::new(RwLock::new(metrics)),
            state: Arc::new(RwLock::new(ControllerState::Idle)),
            log: Arc::new(NullLog),
            status: Arc::new(NullStatus),
            store: Arc::new(NullMetricsStore),
            shutdown,
        }
    }

    /// Attach a log sink.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Attach a status-update sink.
    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    /// Attach a metrics store for opportunistic persistence.
    pub fn with_metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = store;
        self
    }

    /// The communication bus this controller routes hand-offs through.
    pub fn bus(&self) -> &Arc<CommunicationBus> {
        &self.bus
    }

    /// Current metrics snapshot.
    pub async fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            metrics: self.metrics.read().await.clone(),
            state: *self.state.read().await,
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ControllerState {
        *self.state.read().await
    }

    /// Zero all counters and restore the baseline period.
    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.reset(self.config.base_period.as_millis() as u64);
    }

    /// Start the control loop.
    ///
    /// Resumes persisted counters (not runtime state) from the metrics
    /// store, transitions to `Running`, and spawns the timer task. Returns
    /// the [`JoinHandle`] so embedders can await termination. Fails when the
    /// loop is already running.
    pub async fn start(&self) -> RitmoResult<JoinHandle<()>> {
        {
            let mut state = self.state.write().await;
            match *state {
                ControllerState::Idle | ControllerState::Stopped => {}
                other => {
                    return Err(RitmoError::Controller(format!(
                        "Cannot start from state '{other}'"
                    )))
                }
            }
            *state = ControllerState::Running;
        }

        // Resume counters from the last persisted snapshot; runtime state
        // (period, recovery flag) always starts fresh.
        match self.store.load().await {
            Ok(Some(saved)) => {
                let mut metrics = self.metrics.write().await;
                metrics.cycles = saved.cycles;
                metrics.handoffs = saved.handoffs;
                metrics.collaborations = saved.collaborations;
                metrics.errors = saved.errors;
                metrics.recoveries = saved.recoveries;
                metrics.last_worker = saved.last_worker;
                metrics.recovery_mode = false;
                metrics.period_ms = self.config.base_period.as_millis() as u64;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable metrics snapshot"),
        }

        // send_replace updates the value even when no receiver is alive yet.
        self.shutdown.send_replace(false);
        let mut runner = CycleRunner {
            config: self.config.clone(),
            registry: self.registry.clone(),
            bus: self.bus.clone(),
            metrics: self.metrics.clone(),
            state: self.state.clone(),
            log: self.log.clone(),
            status: self.status.clone(),
            store: self.store.clone(),
            consecutive_errors: 0,
            last_handoff: None,
        };
        let mut shutdown = self.shutdown.subscribe();

        info!(period_ms = self.config.base_period.as_millis() as u64, "Controller started");
        Ok(tokio::spawn(async move {
            let mut cycles_this_run: u64 = 0;
            loop {
                let period = Duration::from_millis(runner.metrics.read().await.period_ms);
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(period) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        runner.run_cycle().await;
                        cycles_this_run += 1;
                        if let Some(max) = runner.config.max_cycles {
                            if cycles_this_run >= max {
                                info!(cycles = cycles_this_run, "Cycle budget reached, stopping");
                                *runner.state.write().await = ControllerState::Stopped;
                                break;
                            }
                        }
                    }
                }
            }
            let mut state = runner.state.write().await;
            if *state != ControllerState::Stopped {
                *state = ControllerState::Stopped;
            }
            debug!("Controller loop exited");
        }))
    }

    /// Stop the control loop.
    ///
    /// Cancels the pending timer so no further cycle starts. An in-flight
    /// cycle is allowed to settle on its own; this call does not block on
    /// it.
    pub async fn stop(&self) {
        *self.state.write().await = ControllerState::Stopped;
        self.shutdown.send_replace(true);
        info!("Controller stopped");
    }
}

/// Per-run mutable state owned by the spawned loop task.
struct CycleRunner {
    config: ControllerConfig,
    registry: Arc<RwLock<WorkerRegistry>>,
    bus: Arc<CommunicationBus>,
    metrics: Arc<RwLock<LoopMetrics>>,
    state: Arc<RwLock<ControllerState>>,
    log: Arc<dyn LogSink>,
    status: Arc<dyn StatusSink>,
    store: Arc<dyn MetricsStore>,
    consecutive_errors: u32,
    last_handoff: Option<tokio::time::Instant>,
}

impl CycleRunner {
    /// Execute one cycle, absorbing any error at the boundary.
    async fn run_cycle(&mut self) {
        let cycle = self.metrics.read().await.cycles + 1;
        if let Err(e) = self.cycle(cycle).await {
            error!(cycle, error = %e, "Cycle error absorbed");
            self.consecutive_errors += 1;
            self.metrics.write().await.errors += 1;
            self.enter_recovery("cycle error").await;
        }

        let mut metrics = self.metrics.write().await;
        metrics.cycles = cycle;
        metrics.recovery_mode = *self.state.read().await == ControllerState::RecoveryMode;
        let snapshot = metrics.clone();
        drop(metrics);

        // Opportunistic persistence; a broken store never stalls the loop.
        if let Err(e) = self.store.save(&snapshot).await {
            debug!(error = %e, "Metrics snapshot not persisted");
        }
    }

    async fn cycle(&mut self, cycle: u64) -> RitmoResult<()> {
        self.health_check(cycle).await;
        self.meta_analysis(cycle).await;

        let Some(worker_name) = self.select_worker().await else {
            debug!(cycle, "No workers registered, idle cycle");
            return Ok(());
        };

        let outcome = self.dispatch(cycle, &worker_name).await;
        self.settle(cycle, &worker_name, &outcome).await;

        if let Ok(outcome) = &outcome {
            if outcome.success {
                self.maybe_handoff(cycle, &worker_name, outcome).await;
            }
        }

        self.collaborate(cycle).await;
        self.bookkeep(cycle, &worker_name, &outcome).await;
        Ok(())
    }

    /// Step 1: periodic supervisory health check.
    async fn health_check(&mut self, cycle: u64) {
        let every = self.config.health_check_every;
        if every == 0 || cycle % every != 0 {
            return;
        }
        let Some(supervisor) = self.config.supervisor.clone() else {
            return;
        };

        match self.invoke_with_timeout(cycle, &supervisor).await {
            Ok(outcome) => {
                let detected = outcome.data["errors_detected"].as_u64().unwrap_or(0);
                if detected > 0 {
                    warn!(cycle, detected, "Health check found errors");
                    // Entering recovery already slows the loop down once;
                    // only a repeat detection scales it further.
                    if *self.state.read().await == ControllerState::RecoveryMode {
                        self.scale_period(self.config.slowdown_factor).await;
                    } else {
                        self.enter_recovery("health check").await;
                    }
                } else if self.consecutive_errors == 0 {
                    self.relax_period().await;
                    self.exit_recovery().await;
                }
            }
            Err(e) => {
                warn!(cycle, error = %e, "Health check failed");
                self.metrics.write().await.errors += 1;
            }
        }
    }

    /// Step 2: periodic meta-analysis of the aggregate success rate.
    ///
    /// Skipped in recovery mode; composes with the health check's own
    /// recovery-driven adjustment otherwise.
    async fn meta_analysis(&mut self, cycle: u64) {
        let every = self.config.meta_analysis_every;
        if every == 0 || cycle % every != 0 {
            return;
        }
        if *self.state.read().await == ControllerState::RecoveryMode {
            return;
        }
        let Some(analyst) = self.config.analyst.clone() else {
            return;
        };

        match self.invoke_with_timeout(cycle, &analyst).await {
            Ok(outcome) => {
                // A missing or malformed rate is no signal, not an error.
                let Some(rate) = outcome.data["success_rate"].as_f64() else {
                    return;
                };
                if rate > self.config.success_high_water {
                    self.scale_period(self.config.speedup_factor).await;
                } else if rate < self.config.success_low_water {
                    self.scale_period(self.config.slowdown_factor).await;
                }
            }
            Err(e) => {
                warn!(cycle, error = %e, "Meta-analysis failed");
                self.metrics.write().await.errors += 1;
            }
        }
    }

    /// Step 3: pick the worker for this cycle.
    async fn select_worker(&self) -> Option<String> {
        let registry = self.registry.read().await;
        let workers: Vec<(String, String, u8)> = registry
            .all()
            .iter()
            .map(|w| (w.name.clone(), w.capability.clone(), w.priority))
            .collect();
        drop(registry);

        if workers.is_empty() {
            return None;
        }

        if *self.state.read().await == ControllerState::RecoveryMode {
            // Conservative: uniform among stable workers, any worker as a
            // fallback.
            let stable: Vec<&(String, String, u8)> = workers
                .iter()
                .filter(|(_, _, priority)| *priority >= self.config.stability_threshold)
                .collect();
            let pool = if stable.is_empty() {
                workers.iter().collect()
            } else {
                stable
            };
            let index = (random_roll() % pool.len() as u64) as usize;
            return Some(pool[index].0.clone());
        }

        if let Some(goal) = &self.config.goal {
            let goal = goal.to_lowercase();
            if let Some((name, _, _)) = workers
                .iter()
                .find(|(_, capability, _)| goal.contains(&capability.to_lowercase()))
            {
                return Some(name.clone());
            }
        }

        let weights: Vec<(&str, u8)> = workers
            .iter()
            .map(|(name, _, priority)| (name.as_str(), *priority))
            .collect();
        pick_weighted(&weights, random_roll()).map(|name| name.to_string())
    }

    /// Step 4: dispatch the selected worker under the enforced timeout.
    async fn dispatch(
        &self,
        cycle: u64,
        worker_name: &str,
    ) -> RitmoResult<InvocationOutcome> {
        self.registry
            .write()
            .await
            .set_status(worker_name, WorkerStatus::Running);
        self.invoke_with_timeout(cycle, worker_name).await
    }

    /// Interpret the dispatch outcome: priorities, counters, recovery entry.
    async fn settle(
        &mut self,
        cycle: u64,
        worker_name: &str,
        outcome: &RitmoResult<InvocationOutcome>,
    ) {
        match outcome {
            Ok(outcome) if outcome.success => {
                self.consecutive_errors = 0;
                let mut registry = self.registry.write().await;
                registry.set_status(worker_name, WorkerStatus::Idle);
                registry.set_last_result(worker_name, outcome.message.clone());
                registry.adjust_priority(worker_name, 1);
            }
            Ok(outcome) => {
                self.record_worker_failure(cycle, worker_name, &outcome.message)
                    .await;
            }
            Err(e) => {
                // Timeouts and invocation errors are the same failure.
                let reason = e.to_string();
                self.record_worker_failure(cycle, worker_name, &reason).await;
            }
        }
        self.metrics.write().await.last_worker = Some(worker_name.to_string());
    }

    async fn record_worker_failure(&mut self, cycle: u64, worker_name: &str, reason: &str) {
        warn!(cycle, worker = %worker_name, %reason, "Worker invocation failed");
        self.consecutive_errors += 1;
        self.metrics.write().await.errors += 1;

        let others: Vec<String> = {
            let mut registry = self.registry.write().await;
            registry.set_status(worker_name, WorkerStatus::Error);
            registry.set_last_result(worker_name, reason);
            registry.adjust_priority(worker_name, -2);
            registry
                .names()
                .iter()
                .filter(|n| **n != worker_name)
                .map(|n| (*n).to_string())
                .collect()
        };

        // Let the rest of the pool know; partial delivery is fine.
        let _ = self
            .bus
            .broadcast(
                worker_name,
                MessageKind::ErrorAlert,
                serde_json::json!({"worker": worker_name, "reason": reason}),
                &others,
            )
            .await;

        if self.consecutive_errors >= self.config.consecutive_error_threshold {
            self.enter_recovery("consecutive failures").await;
        }
    }

    /// Step 5: rate-limited hand-off to the worker named by the outcome.
    async fn maybe_handoff(&mut self, cycle: u64, from: &str, outcome: &InvocationOutcome) {
        let Some(next) = &outcome.next_worker else {
            return;
        };
        if let Some(last) = self.last_handoff {
            if last.elapsed() < self.config.handoff_min_interval {
                debug!(cycle, next = %next, "Hand-off rate limit, skipping");
                return;
            }
        }
        if !self.registry.read().await.contains(next) {
            warn!(cycle, next = %next, "Hand-off target not registered, skipping");
            return;
        }

        let request = Message::to_worker(
            from,
            next.clone(),
            MessageKind::TaskRequest,
            serde_json::json!({
                "kind": "handoff",
                "from": from,
                "context": outcome.message,
            }),
        );
        match self.bus.send(request).await {
            Ok(response) => {
                self.last_handoff = Some(tokio::time::Instant::now());
                self.metrics.write().await.handoffs += 1;
                let summary = response
                    .map(|r| r.payload["message"].as_str().unwrap_or("").to_string())
                    .unwrap_or_default();
                info!(cycle, from = %from, to = %next, "Hand-off complete");
                self.log
                    .append(LogEntry::new(next.clone(), "handoff", summary))
                    .await;
            }
            Err(e) => {
                warn!(cycle, from = %from, to = %next, error = %e, "Hand-off failed");
                self.metrics.write().await.errors += 1;
            }
        }
    }

    /// Step 6: periodic collaboration round.
    async fn collaborate(&mut self, cycle: u64) {
        let every = self.config.collaboration_every;
        if every == 0 || cycle % every != 0 {
            return;
        }
        let Some(collaborator) = self.config.collaborator.clone() else {
            return;
        };

        match self.invoke_with_timeout(cycle, &collaborator).await {
            Ok(outcome) if outcome.success => {
                self.metrics.write().await.collaborations += 1;
                info!(cycle, worker = %collaborator, "Collaboration round complete");
            }
            Ok(outcome) => {
                debug!(cycle, result = %outcome.message, "Collaboration round unsuccessful");
            }
            Err(e) => {
                warn!(cycle, error = %e, "Collaboration round failed");
                self.metrics.write().await.errors += 1;
            }
        }
    }

    /// Step 7: structured log entry plus status narration.
    async fn bookkeep(
        &self,
        cycle: u64,
        worker_name: &str,
        outcome: &RitmoResult<InvocationOutcome>,
    ) {
        let result = match outcome {
            Ok(o) if o.success => o.message.clone(),
            Ok(o) => format!("failed: {}", o.message),
            Err(e) => format!("error: {e}"),
        };
        self.log
            .append(LogEntry::new(worker_name, "dispatch", result.clone()))
            .await;
        self.status
            .notify(&format!("cycle {cycle}: {worker_name} -> {result}"))
            .await;
    }

    async fn invoke_with_timeout(
        &self,
        cycle: u64,
        worker_name: &str,
    ) -> RitmoResult<InvocationOutcome> {
        let handler = self
            .registry
            .read()
            .await
            .handler(worker_name)
            .ok_or_else(|| RitmoError::WorkerNotFound(worker_name.to_string()))?;

        let mut ctx = InvocationContext::for_cycle(cycle);
        ctx.goal = self.config.goal.clone();

        tokio::time::timeout(self.config.invoke_timeout, handler.invoke(ctx))
            .await
            .map_err(|_| RitmoError::WorkerTimeout {
                worker: worker_name.to_string(),
                timeout_ms: self.config.invoke_timeout.as_millis() as u64,
            })?
    }

    async fn enter_recovery(&mut self, reason: &str) {
        let mut state = self.state.write().await;
        if *state == ControllerState::RecoveryMode {
            return;
        }
        *state = ControllerState::RecoveryMode;
        drop(state);

        warn!(%reason, "Entering recovery mode");
        let mut metrics = self.metrics.write().await;
        metrics.recoveries += 1;
        metrics.recovery_mode = true;
        drop(metrics);
        self.scale_period(self.config.slowdown_factor).await;
        self.status
            .notify(&format!("entering recovery mode ({reason})"))
            .await;
    }

    async fn exit_recovery(&self) {
        let mut state = self.state.write().await;
        if *state != ControllerState::RecoveryMode {
            return;
        }
        *state = ControllerState::Running;
        drop(state);
        info!("Leaving recovery mode");
        self.metrics.write().await.recovery_mode = false;
        self.status.notify("leaving recovery mode").await;
    }

    /// Multiply the period by `factor`, clamped to the configured bounds.
    async fn scale_period(&self, factor: f64) {
        let mut metrics = self.metrics.write().await;
        let scaled = (metrics.period_ms as f64 * factor).round() as u64;
        metrics.period_ms = scaled.clamp(
            self.config.min_period.as_millis() as u64,
            self.config.max_period.as_millis() as u64,
        );
    }

    /// Decay the period back toward the baseline, flooring at it.
    async fn relax_period(&self) {
        let base = self.config.base_period.as_millis() as u64;
        let mut metrics = self.metrics.write().await;
        if metrics.period_ms <= base {
            return;
        }
        let relaxed = (metrics.period_ms as f64 * self.config.relax_factor).round() as u64;
        metrics.period_ms = relaxed.max(base);
    }
}

/// Weighted pick over `(name, weight)` pairs: selection probability is
/// proportional to weight, implemented as a cumulative-weight search instead
/// of materializing a replicated pool.
fn pick_weighted<'a>(weights: &[(&'a str, u8)], roll: u64) -> Option<&'a str> {
    let total: u64 = weights.iter().map(|(_, w)| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }
    let point = roll % total;

    let mut cumulative: u64 = 0;
    let prefix: Vec<u64> = weights
        .iter()
        .map(|(_, w)| {
            cumulative += u64::from(*w);
            cumulative
        })
        .collect();
    let index = prefix.partition_point(|&sum| sum <= point);
    weights.get(index).map(|(name, _)| *name)
}

/// A uniform random draw, sourced from the OS.
fn random_roll() -> u64 {
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        // The OS source is effectively infallible; degrade to the clock
        // rather than stalling the loop.
        return u64::from(Utc::now().timestamp_subsec_nanos());
    }
    u64::from_le_bytes(buf)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_weighted_distribution_boundaries() {
        let weights = [("a", 1), ("b", 3), ("c", 1)];
        // Cumulative sums: a=[0,1), b=[1,4), c=[4,5).
        assert_eq!(pick_weighted(&weights, 0), Some("a"));
        assert_eq!(pick_weighted(&weights, 1), Some("b"));
        assert_eq!(pick_weighted(&weights, 3), Some("b"));
        assert_eq!(pick_weighted(&weights, 4), Some("c"));
        // Rolls wrap modulo the total weight.
        assert_eq!(pick_weighted(&weights, 5), Some("a"));
        assert_eq!(pick_weighted(&weights, 6 + 5 * 7), Some("b"));
    }

    #[test]
    fn test_pick_weighted_proportionality() {
        let weights = [("light", 1), ("heavy", 4)];
        let hits = (0..5)
            .filter(|roll| pick_weighted(&weights, *roll) == Some("heavy"))
            .count();
        assert_eq!(hits, 4);
    }

    #[test]
    fn test_pick_weighted_empty_and_zero() {
        assert_eq!(pick_weighted(&[], 7), None);
        assert_eq!(pick_weighted(&[("a", 0)], 7), None);
    }

    #[test]
    fn test_random_roll_varies() {
        // Not a statistical test; just catches a wedged source.
        let rolls: std::collections::HashSet<u64> = (0..8).map(|_| random_roll()).collect();
        assert!(rolls.len() > 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.base_period, Duration::from_millis(1000));
        assert_eq!(config.consecutive_error_threshold, 3);
        assert_eq!(config.stability_threshold, 3);
        assert!(config.max_cycles.is_none());
        assert!(config.health_check_every < config.meta_analysis_every);
    }

    #[test]
    fn test_controller_state_display() {
        assert_eq!(ControllerState::RecoveryMode.to_string(), "recovery_mode");
        assert_eq!(ControllerState::Stopped.to_string(), "stopped");
    }
}
