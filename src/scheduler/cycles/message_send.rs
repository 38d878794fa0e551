use crate::scheduler::context::{CycleContext, DeliveryOutcome};
use crate::scheduler::cycle::{Cycle, CycleError, CycleKind, CycleReport, CycleSchedule};
use crate::store::UserQuery;
use async_trait::async_trait;
use std::time::Duration;

/// Delivers digests to pro users with a linked chat once their cooldown has
/// elapsed, refreshing stale content first.
pub struct MessageSendCycle {
    every: Duration,
    jitter: Duration,
}

impl MessageSendCycle {
    pub fn new(every: Duration, jitter: Duration) -> Self {
        Self { every, jitter }
    }
}

#[async_trait]
impl Cycle for MessageSendCycle {
    fn kind(&self) -> CycleKind {
        CycleKind::MessageSend
    }

    fn schedule(&self) -> CycleSchedule {
        CycleSchedule::Interval {
            every: self.every,
            run_on_startup: true,
            jitter: self.jitter,
        }
    }

    async fn run(&self, ctx: &CycleContext) -> Result<CycleReport, CycleError> {
        if ctx.pipeline.digest_sender().is_none() {
            return Ok(CycleReport::default());
        }

        let users = ctx
            .store
            .fetch_users(UserQuery::ProUsersWithMessaging)
            .await?;
        let mut report = CycleReport {
            fetched: users.len(),
            ..Default::default()
        };

        for user in users {
            if ctx.is_shutting_down() {
                break;
            }
            match ctx.deliver_digest(user, false).await {
                DeliveryOutcome::NotDue | DeliveryOutcome::NotConfigured => {}
                DeliveryOutcome::Busy => {
                    report.due += 1;
                    report.skipped += 1;
                }
                outcome if outcome.delivered() => {
                    report.due += 1;
                    report.succeeded += 1;
                }
                _ => {
                    report.due += 1;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
