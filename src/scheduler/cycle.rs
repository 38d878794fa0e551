use super::context::CycleContext;
use super::midnight::delay_until_next_local_midnight;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The four repeating cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleKind {
    ScheduledRefresh,
    ImmediateCheck,
    MessageSend,
    MidnightRefresh,
}

impl CycleKind {
    pub const ALL: [CycleKind; 4] = [
        CycleKind::ScheduledRefresh,
        CycleKind::ImmediateCheck,
        CycleKind::MessageSend,
        CycleKind::MidnightRefresh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CycleKind::ScheduledRefresh => "scheduled-refresh",
            CycleKind::ImmediateCheck => "immediate-check",
            CycleKind::MessageSend => "message-send",
            CycleKind::MidnightRefresh => "midnight-refresh",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When a cycle runs next.
#[derive(Debug, Clone)]
pub enum CycleSchedule {
    /// Fixed period measured from the end of the previous run.
    Interval {
        every: Duration,
        run_on_startup: bool,
        /// Upper bound of a random extra delay; zero disables it.
        jitter: Duration,
    },
    /// Next local midnight, recomputed before every wait.
    DailyMidnight { timezone: Tz },
}

impl CycleSchedule {
    pub fn runs_on_startup(&self) -> bool {
        match self {
            CycleSchedule::Interval { run_on_startup, .. } => *run_on_startup,
            CycleSchedule::DailyMidnight { .. } => false,
        }
    }

    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            CycleSchedule::Interval { every, jitter, .. } => {
                let jitter_ms = jitter.as_millis() as u64;
                if jitter_ms == 0 {
                    *every
                } else {
                    *every + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
                }
            }
            CycleSchedule::DailyMidnight { timezone } => {
                delay_until_next_local_midnight(now, *timezone)
            }
        }
    }
}

/// Counters for one cycle run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Users returned by the store.
    pub fetched: usize,
    /// Users the decision rules selected.
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due users left alone because another cycle held them.
    pub skipped: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} due, {} ok, {} failed, {} skipped",
            self.fetched, self.due, self.succeeded, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to fetch users: {0}")]
    Fetch(#[from] StoreError),

    #[error("Cycle processing failed: {0}")]
    Processing(String),
}

#[async_trait]
pub trait Cycle: Send + Sync {
    fn kind(&self) -> CycleKind;

    fn schedule(&self) -> CycleSchedule;

    /// One pass over the relevant users.
    async fn run(&self, ctx: &CycleContext) -> Result<CycleReport, CycleError>;
}
