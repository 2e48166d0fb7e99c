use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::engine::{CycleReport, Engine};
use super::state::{RunnerInfo, RunnerState};
use crate::definition::{Fingerprint, MonitorDefinition, MonitorKey};

#[derive(Debug, Default)]
struct RunnerStats {
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl RunnerStats {
    async fn record(&self, report: CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if !report.succeeded() {
            self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_cycle.write().await = Some(report);
    }
}

struct RunnerTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Live scheduling handle for one monitor definition snapshot.
///
/// Cycles run inline on the runner's own task, so two cycles of the same
/// monitor never overlap; ticks missed while a cycle overruns are skipped.
pub struct Runner {
    definition: Arc<MonitorDefinition>,
    engine: Arc<Engine>,
    state: RunnerState,
    task: Option<RunnerTask>,
    started_at: Option<DateTime<Utc>>,
    stats: Arc<RunnerStats>,
}

impl Runner {
    pub fn new(definition: Arc<MonitorDefinition>, engine: Arc<Engine>) -> Self {
        Self {
            definition,
            engine,
            state: RunnerState::Idle,
            task: None,
            started_at: None,
            stats: Arc::new(RunnerStats::default()),
        }
    }

    pub fn key(&self) -> &MonitorKey {
        &self.definition.key
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.definition.fingerprint
    }

    pub fn definition(&self) -> &Arc<MonitorDefinition> {
        &self.definition
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.stats.cycles.load(Ordering::Relaxed)
    }

    /// Spawn the periodic task. The first cycle runs one period after start.
    ///
    /// # Panics
    ///
    /// Panics if the runner is already running: a second schedule for the
    /// same identity would break the one-runner-per-monitor invariant.
    pub fn start(&mut self) {
        assert!(
            self.state.can_transition_to(RunnerState::Running),
            "tried to start an already started runner for monitor {} (state: {})",
            self.definition.key,
            self.state
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.definition),
            Arc::clone(&self.engine),
            Arc::clone(&self.stats),
            token.clone(),
        ));

        self.task = Some(RunnerTask { token, handle });
        self.state = RunnerState::Running;
        self.started_at = Some(Utc::now());
        info!(
            monitor = %self.definition.key,
            fingerprint = %self.definition.fingerprint,
            period_ms = self.definition.period.as_millis() as u64,
            "Runner started"
        );
    }

    /// Cancel the schedule and wait for an in-flight cycle to finish. No
    /// cycle begins after this returns. A runner that was never started is
    /// left untouched.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            debug!(monitor = %self.definition.key, state = %self.state, "Stop on a runner that is not running");
            return;
        };

        self.state = RunnerState::Stopping;
        info!(monitor = %self.definition.key, "Stopping runner");
        task.token.cancel();
        if let Err(e) = task.handle.await {
            error!(monitor = %self.definition.key, error = %e, "Runner task ended abnormally");
        }
        self.state = RunnerState::Stopped;
        info!(monitor = %self.definition.key, "Runner stopped");
    }

    pub async fn info(&self) -> RunnerInfo {
        let last_cycle = self.stats.last_cycle.read().await.clone();
        RunnerInfo {
            monitor: self.definition.key.clone(),
            fingerprint: self.definition.fingerprint.clone(),
            state: self.state,
            period_ms: self.definition.period.as_millis() as u64,
            request_count: self.definition.requests.len(),
            cleanup_count: self.definition.cleanup.len(),
            started_at: self.started_at,
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            failed_cycles: self.stats.failed_cycles.load(Ordering::Relaxed),
            last_cycle_at: last_cycle.as_ref().map(|c| c.started_at),
            last_cycle,
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.token.cancel();
        }
    }
}

async fn run_loop(
    definition: Arc<MonitorDefinition>,
    engine: Arc<Engine>,
    stats: Arc<RunnerStats>,
    token: CancellationToken,
) {
    let period = definition.period;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let report = engine.execute_cycle(&definition).await;
        stats.record(report).await;
    }

    debug!(monitor = %definition.key, "Runner loop exited");
}
