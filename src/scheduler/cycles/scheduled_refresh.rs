use crate::scheduler::context::{CycleContext, UserOutcome};
use crate::scheduler::cycle::{Cycle, CycleError, CycleKind, CycleReport, CycleSchedule};
use crate::store::UserQuery;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

/// Refreshes pro users whose content is older than the refresh window.
pub struct ScheduledRefreshCycle {
    every: Duration,
    jitter: Duration,
}

impl ScheduledRefreshCycle {
    pub fn new(every: Duration, jitter: Duration) -> Self {
        Self { every, jitter }
    }
}

#[async_trait]
impl Cycle for ScheduledRefreshCycle {
    fn kind(&self) -> CycleKind {
        CycleKind::ScheduledRefresh
    }

    fn schedule(&self) -> CycleSchedule {
        CycleSchedule::Interval {
            every: self.every,
            run_on_startup: true,
            jitter: self.jitter,
        }
    }

    async fn run(&self, ctx: &CycleContext) -> Result<CycleReport, CycleError> {
        let users = ctx.store.fetch_users(UserQuery::ProUsers).await?;
        let now = Utc::now();
        let mut report = CycleReport {
            fetched: users.len(),
            ..Default::default()
        };

        for user in users
            .iter()
            .filter(|u| ctx.pipeline.staleness().needs_scheduled_update(u, now))
        {
            if ctx.is_shutting_down() {
                debug!("Shutdown requested, leaving remaining users for the next start");
                break;
            }
            report.due += 1;
            match ctx.process_user(user, false).await {
                UserOutcome::Succeeded => report.succeeded += 1,
                UserOutcome::Failed => report.failed += 1,
                UserOutcome::Busy => report.skipped += 1,
            }
        }

        Ok(report)
    }
}
