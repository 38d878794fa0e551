use super::initial_send::InitialSendTracker;
use crate::config::ScheduleSettings;
use crate::lock::LockRegistry;
use crate::model::{UserRecord, UserUpdate};
use crate::pipeline::ContentPipeline;
use crate::store::UserStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened to one user inside a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Succeeded,
    Failed,
    /// Another cycle held the user.
    Busy,
}

/// Result of a digest delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent(usize),
    /// The forced refresh already delivered the digest.
    SentDuringRefresh,
    NotDue,
    Busy,
    RefreshFailed,
    SendFailed,
    NotConfigured,
}

impl DeliveryOutcome {
    pub fn delivered(self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Sent(_) | DeliveryOutcome::SentDuringRefresh
        )
    }
}

/// Shared resources handed to every cycle run.
#[derive(Clone)]
pub struct CycleContext {
    pub store: Arc<dyn UserStore>,
    pub pipeline: Arc<ContentPipeline>,
    pub locks: LockRegistry,
    pub initial_sends: InitialSendTracker,
    /// Cancelled on shutdown; pending one-shot sends stop waiting.
    pub shutdown: CancellationToken,
    pub initial_send_delay: Duration,
    pub midnight_user_concurrency: usize,
}

impl CycleContext {
    pub fn new(
        pipeline: Arc<ContentPipeline>,
        locks: LockRegistry,
        initial_sends: InitialSendTracker,
        shutdown: CancellationToken,
        settings: &ScheduleSettings,
    ) -> Self {
        Self {
            store: Arc::clone(pipeline.store()),
            pipeline,
            locks,
            initial_sends,
            shutdown,
            initial_send_delay: settings.initial_send_delay,
            midnight_user_concurrency: settings.midnight_user_concurrency,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Runs the pipeline for `user` while holding its lock.
    pub async fn process_user(&self, user: &UserRecord, force_run: bool) -> UserOutcome {
        let Some(_lease) = self.locks.try_acquire(&user.key) else {
            return UserOutcome::Busy;
        };
        if self.pipeline.run(user, force_run).await {
            UserOutcome::Succeeded
        } else {
            UserOutcome::Failed
        }
    }

    /// Sends a digest to `user`, refreshing stale content first.
    ///
    /// `initial` bypasses the messaging cooldown. The user's lock is held for
    /// the whole attempt.
    pub async fn deliver_digest(&self, user: UserRecord, initial: bool) -> DeliveryOutcome {
        let Some(digest) = self.pipeline.digest_sender() else {
            return DeliveryOutcome::NotConfigured;
        };
        let Some(_lease) = self.locks.try_acquire(&user.key) else {
            return DeliveryOutcome::Busy;
        };

        let mut user = user;
        if self.pipeline.staleness().is_content_stale(&user, Utc::now()) {
            info!("Content for {} is stale, refreshing before sending", user.key);
            let sent_before = user.tele_last_sent;
            if !self.pipeline.run(&user, true).await {
                warn!("Refresh for {} failed, skipping digest", user.key);
                return DeliveryOutcome::RefreshFailed;
            }
            user = match self.store.fetch_user(&user.key).await {
                Ok(Some(fresh)) => fresh,
                Ok(None) => {
                    warn!("User {} disappeared after refresh", user.key);
                    return DeliveryOutcome::RefreshFailed;
                }
                Err(e) => {
                    warn!("Failed to re-read {} after refresh: {}", user.key, e);
                    return DeliveryOutcome::RefreshFailed;
                }
            };
            if user.tele_last_sent != sent_before {
                return DeliveryOutcome::SentDuringRefresh;
            }
        }

        let now = Utc::now();
        if !digest.policy().is_send_due(&user, now, initial) {
            return DeliveryOutcome::NotDue;
        }
        let Some(recipient) = user.messaging_id.as_deref() else {
            return DeliveryOutcome::NotDue;
        };

        let report = digest
            .send_digest(recipient, &user.deliverable_content())
            .await;
        if !report.any_sent() {
            return DeliveryOutcome::SendFailed;
        }

        let update = UserUpdate {
            tele_last_sent: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.store.apply_update(&user.key, &update).await {
            warn!("Failed to record digest delivery for {}: {}", user.key, e);
        }
        DeliveryOutcome::Sent(report.sent)
    }

    /// Persists the scheduling mark for `user` and, once that write lands,
    /// arms a one-shot delayed first digest.
    ///
    /// Returns true when a send was armed.
    pub async fn schedule_initial_send(&self, user: &UserRecord) -> bool {
        if self.initial_sends.is_pending(&user.key) {
            return false;
        }

        let update = UserUpdate {
            initial_send_scheduled_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.store.apply_update(&user.key, &update).await {
            warn!(
                "Failed to mark initial send for {}, not scheduling: {}",
                user.key, e
            );
            return false;
        }

        if !self.initial_sends.insert(&user.key) {
            return false;
        }

        let ctx = self.clone();
        let key = user.key.clone();
        info!(
            "Scheduled initial digest for {} in {:?}",
            key, self.initial_send_delay
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(ctx.initial_send_delay) => {
                    ctx.run_initial_send(&key).await;
                }
                _ = ctx.shutdown.cancelled() => {
                    debug!("Initial digest for {} cancelled by shutdown", key);
                }
            }
            ctx.initial_sends.remove(&key);
        });
        true
    }

    async fn run_initial_send(&self, key: &str) {
        let user = match self.store.fetch_user(key).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("User {} not found for initial digest", key);
                return;
            }
            Err(e) => {
                warn!("Failed to load {} for initial digest: {}", key, e);
                return;
            }
        };

        // A refresh in the meantime may already have delivered the first digest.
        if let (Some(sent), Some(scheduled)) = (user.tele_last_sent, user.initial_send_scheduled_at) {
            if sent >= scheduled {
                info!("Initial digest for {} already delivered, skipping", key);
                return;
            }
        }

        let outcome = self.deliver_digest(user, true).await;
        info!("Initial digest for {}: {:?}", key, outcome);
    }
}
