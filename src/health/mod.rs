//! Observable worker state behind the `/health` endpoint.
//!
//! Cycle loops write into their [`CycleState`]; the HTTP layer only reads
//! through [`HealthState::snapshot`].

use crate::lock::LockRegistry;
use crate::scheduler::{CycleKind, InitialSendTracker};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CycleTimes {
    next_run_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
}

/// Running flag and timing of one cycle.
#[derive(Debug)]
pub struct CycleState {
    kind: CycleKind,
    running: AtomicBool,
    scheduled: AtomicBool,
    times: Mutex<CycleTimes>,
}

impl CycleState {
    pub fn new(kind: CycleKind) -> Self {
        Self {
            kind,
            running: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            times: Mutex::new(CycleTimes::default()),
        }
    }

    pub fn kind(&self) -> CycleKind {
        self.kind
    }

    /// Sets the running flag. Returns `None` when a run is already in progress.
    pub fn try_start(self: &Arc<Self>) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        metrics::set_cycle_running(self.kind.name(), true);
        Some(RunningGuard {
            state: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn set_scheduled(&self, scheduled: bool) {
        self.scheduled.store(scheduled, Ordering::SeqCst);
    }

    pub fn set_next_run(&self, at: Option<DateTime<Utc>>) {
        self.times().next_run_at = at;
    }

    pub fn mark_finished(&self, at: DateTime<Utc>) {
        self.times().last_finished_at = Some(at);
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        let times = self.times();
        CycleSnapshot {
            running: self.is_running(),
            scheduled: self.is_scheduled(),
            next_run_at: times.next_run_at,
            last_finished_at: times.last_finished_at,
        }
    }

    fn times(&self) -> MutexGuard<'_, CycleTimes> {
        self.times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the running flag on drop, including when the run panicked.
#[derive(Debug)]
pub struct RunningGuard {
    state: Arc<CycleState>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
        metrics::set_cycle_running(self.state.kind.name(), false);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSnapshot {
    pub running: bool,
    pub scheduled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub cycles: BTreeMap<&'static str, CycleSnapshot>,
    pub users_processing: Vec<String>,
    pub pending_initial_sends: usize,
}

struct HealthInner {
    started_at: Instant,
    version: String,
    cycles: BTreeMap<CycleKind, Arc<CycleState>>,
    locks: LockRegistry,
    initial_sends: InitialSendTracker,
}

#[derive(Clone)]
pub struct HealthState {
    inner: Arc<HealthInner>,
}

impl HealthState {
    pub fn new(
        version: impl Into<String>,
        locks: LockRegistry,
        initial_sends: InitialSendTracker,
    ) -> Self {
        let cycles = CycleKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(CycleState::new(*kind))))
            .collect();
        Self {
            inner: Arc::new(HealthInner {
                started_at: Instant::now(),
                version: version.into(),
                cycles,
                locks,
                initial_sends,
            }),
        }
    }

    pub fn cycle(&self, kind: CycleKind) -> Arc<CycleState> {
        match self.inner.cycles.get(&kind) {
            Some(state) => Arc::clone(state),
            None => Arc::new(CycleState::new(kind)),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            version: self.inner.version.clone(),
            uptime_secs: self.uptime().as_secs(),
            cycles: self
                .inner
                .cycles
                .iter()
                .map(|(kind, state)| (kind.name(), state.snapshot()))
                .collect(),
            users_processing: self.inner.locks.held_keys(),
            pending_initial_sends: self.inner.initial_sends.pending_count(),
        }
    }
}
