use crate::scheduler::context::{CycleContext, UserOutcome};
use crate::scheduler::cycle::{Cycle, CycleError, CycleKind, CycleReport, CycleSchedule};
use crate::store::UserQuery;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Picks up new users, changed preferences and placeholder content within
/// seconds, and arms the delayed first digest for newly linked chats.
pub struct ImmediateCheckCycle {
    every: Duration,
    jitter: Duration,
}

impl ImmediateCheckCycle {
    pub fn new(every: Duration, jitter: Duration) -> Self {
        Self { every, jitter }
    }
}

#[async_trait]
impl Cycle for ImmediateCheckCycle {
    fn kind(&self) -> CycleKind {
        CycleKind::ImmediateCheck
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
        let mut report = CycleReport {
            fetched: users.len(),
            ..Default::default()
        };

        // Initial sends are marked first; a digest sent by a refresh below is
        // stamped after the mark.
        if ctx.pipeline.digest_sender().is_some() {
            for user in users.iter().filter(|u| {
                u.messaging_id.is_some() && u.initial_send_scheduled_at.is_none()
            }) {
                if ctx.is_shutting_down() {
                    break;
                }
                if ctx.schedule_initial_send(user).await {
                    debug!("Armed initial digest for {}", user.key);
                }
            }
        }

        for user in users
            .iter()
            .filter(|u| ctx.pipeline.staleness().needs_immediate_update(u))
        {
            if ctx.is_shutting_down() {
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
