use super::context::CycleContext;
use super::cycle::{Cycle, CycleError, CycleKind, CycleReport};
use crate::health::{CycleState, HealthState};
use crate::server::metrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Cycle {cycle} panicked: {message}")]
    CyclePanicked { cycle: CycleKind, message: String },
}

/// Result of a single attempt to run a cycle.
#[derive(Debug)]
pub enum CycleRun {
    Finished(Result<CycleReport, CycleError>),
    /// The previous run of the same cycle had not finished yet.
    AlreadyRunning,
    /// Shutdown arrived and the run outlived the grace period.
    Abandoned,
}

/// Drives every registered cycle on its own self-rescheduling loop.
pub struct CycleScheduler {
    cycles: Vec<Arc<dyn Cycle>>,
    context: CycleContext,
    health: HealthState,
    shutdown_token: CancellationToken,
    grace: Duration,
}

impl CycleScheduler {
    pub fn new(context: CycleContext, health: HealthState, grace: Duration) -> Self {
        Self {
            cycles: Vec::new(),
            shutdown_token: context.shutdown.clone(),
            context,
            health,
            grace,
        }
    }

    pub fn register(&mut self, cycle: Arc<dyn Cycle>) {
        info!("Registering cycle: {}", cycle.kind());
        self.cycles.push(cycle);
    }

    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    /// Runs until the shutdown token is cancelled.
    ///
    /// A panicking cycle cancels the token, which stops every other loop, and
    /// the panic is returned as an error.
    pub async fn run(self) -> Result<(), SchedulerError> {
        info!("Starting cycle scheduler with {} cycles", self.cycles.len());

        let loops: Vec<_> = self
            .cycles
            .iter()
            .map(|cycle| {
                let cycle = Arc::clone(cycle);
                let context = self.context.clone();
                let state = self.health.cycle(cycle.kind());
                let token = self.shutdown_token.clone();
                let grace = self.grace;
                tokio::spawn(drive_cycle(cycle, context, state, token, grace))
            })
            .collect();

        let mut first_error = None;
        for (handle, cycle) in loops.into_iter().zip(&self.cycles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SchedulerError::CyclePanicked {
                    cycle: cycle.kind(),
                    message: e.to_string(),
                }),
            };
            if let Err(e) = result {
                self.shutdown_token.cancel();
                first_error.get_or_insert(e);
            }
        }

        info!("Cycle scheduler stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn drive_cycle(
    cycle: Arc<dyn Cycle>,
    context: CycleContext,
    state: Arc<CycleState>,
    token: CancellationToken,
    grace: Duration,
) -> Result<(), SchedulerError> {
    let kind = cycle.kind();
    let schedule = cycle.schedule();
    let mut first = true;
    state.set_scheduled(true);

    let result = loop {
        let delay = if first && schedule.runs_on_startup() {
            Duration::ZERO
        } else {
            schedule.next_delay(Utc::now())
        };
        first = false;

        let next_run = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        state.set_next_run(Some(next_run));
        debug!("Cycle {} sleeping for {:?}", kind, delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => {
                break Ok(());
            }
        }
        state.set_next_run(None);

        match run_cycle_once(&cycle, &context, &state, &token, grace).await {
            Ok(CycleRun::Abandoned) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };

    state.set_scheduled(false);
    state.set_next_run(None);
    debug!("Cycle {} loop exited", kind);
    result
}

/// Runs `cycle` once unless a previous run is still in progress.
///
/// The run is spawned so a panic surfaces as a join error instead of
/// unwinding through the scheduler. On shutdown the run gets `grace` to
/// finish before it is abandoned.
pub async fn run_cycle_once(
    cycle: &Arc<dyn Cycle>,
    context: &CycleContext,
    state: &Arc<CycleState>,
    token: &CancellationToken,
    grace: Duration,
) -> Result<CycleRun, SchedulerError> {
    let kind = cycle.kind();
    let Some(_running) = state.try_start() else {
        warn!("Cycle {} is still running, skipping this tick", kind);
        return Ok(CycleRun::AlreadyRunning);
    };

    info!("Starting cycle: {}", kind);
    let start_time = Instant::now();

    let task_cycle = Arc::clone(cycle);
    let task_context = context.clone();
    let mut handle = tokio::spawn(async move { task_cycle.run(&task_context).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = token.cancelled() => {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Cycle {} did not finish within {:?} of shutdown, abandoning it", kind, grace);
                    handle.abort();
                    metrics::record_cycle_run(kind.name(), "abandoned", start_time.elapsed());
                    return Ok(CycleRun::Abandoned);
                }
            }
        }
    };
    let elapsed = start_time.elapsed();
    state.mark_finished(Utc::now());

    match joined {
        Ok(Ok(report)) => {
            info!("Cycle {} completed successfully in {:?}: {}", kind, elapsed, report);
            metrics::record_cycle_run(kind.name(), "success", elapsed);
            Ok(CycleRun::Finished(Ok(report)))
        }
        Ok(Err(e)) => {
            error!("Cycle {} failed after {:?}: {}", kind, elapsed, e);
            metrics::record_cycle_run(kind.name(), "failed", elapsed);
            Ok(CycleRun::Finished(Err(e)))
        }
        Err(e) if e.is_panic() => {
            error!("Cycle {} panicked after {:?}: {}", kind, elapsed, e);
            metrics::record_cycle_run(kind.name(), "panic", elapsed);
            token.cancel();
            Err(SchedulerError::CyclePanicked {
                cycle: kind,
                message: e.to_string(),
            })
        }
        Err(e) => {
            warn!("Cycle {} task was cancelled after {:?}: {}", kind, elapsed, e);
            metrics::record_cycle_run(kind.name(), "cancelled", elapsed);
            Ok(CycleRun::Abandoned)
        }
    }
}
