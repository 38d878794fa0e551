use crate::limiter::{run_limited, Settled};
use crate::scheduler::context::{CycleContext, UserOutcome};
use crate::scheduler::cycle::{Cycle, CycleError, CycleKind, CycleReport, CycleSchedule};
use crate::store::UserQuery;
use async_trait::async_trait;
use chrono_tz::Tz;
use std::convert::Infallible;
use tracing::error;

/// Force-refreshes every pro user at local midnight.
pub struct MidnightRefreshCycle {
    timezone: Tz,
}

impl MidnightRefreshCycle {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

#[async_trait]
impl Cycle for MidnightRefreshCycle {
    fn kind(&self) -> CycleKind {
        CycleKind::MidnightRefresh
    }

    fn schedule(&self) -> CycleSchedule {
        CycleSchedule::DailyMidnight {
            timezone: self.timezone,
        }
    }

    async fn run(&self, ctx: &CycleContext) -> Result<CycleReport, CycleError> {
        let users = ctx.store.fetch_users(UserQuery::ProUsers).await?;
        let mut report = CycleReport {
            fetched: users.len(),
            due: users.len(),
            ..Default::default()
        };

        let factories: Vec<_> = users
            .into_iter()
            .map(|user| {
                let ctx = ctx.clone();
                move || async move { Ok::<_, Infallible>(ctx.process_user(&user, true).await) }
            })
            .collect();

        for settled in run_limited(factories, ctx.midnight_user_concurrency).await {
            match settled {
                Settled::Fulfilled(UserOutcome::Succeeded) => report.succeeded += 1,
                Settled::Fulfilled(UserOutcome::Failed) => report.failed += 1,
                Settled::Fulfilled(UserOutcome::Busy) => report.skipped += 1,
                Settled::Rejected(e) => {
                    error!("Midnight refresh task for a user failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
