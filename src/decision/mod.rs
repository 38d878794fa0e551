//! Pure staleness rules.
//!
//! Both policies take `now` explicitly so every decision can be checked
//! against a fixed clock.

use crate::model::{Category, ContentField, UserRecord};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Never generated, preferences changed, or a category still shows the placeholder.
    Immediate,
    /// Content is older than the refresh window.
    Scheduled,
    UpToDate,
}

#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    refresh_window: Duration,
}

impl StalenessPolicy {
    pub fn new(refresh_window: Duration) -> Self {
        Self { refresh_window }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours as i64))
    }

    pub fn refresh_window(&self) -> Duration {
        self.refresh_window
    }

    pub fn needs_scheduled_update(&self, user: &UserRecord, now: DateTime<Utc>) -> bool {
        if !user.is_pro {
            return false;
        }
        let Some(last_job) = user.last_job else {
            return true;
        };
        last_job < now - self.refresh_window || preferences_changed_since(user, last_job)
    }

    pub fn needs_immediate_update(&self, user: &UserRecord) -> bool {
        if !user.is_pro {
            return false;
        }
        let Some(last_job) = user.last_job else {
            return true;
        };
        if preferences_changed_since(user, last_job) {
            return true;
        }
        Category::ALL.iter().any(|category| {
            user.exposed(*category)
                .map_or(true, ContentField::is_placeholder)
        })
    }

    /// Immediate wins when both apply.
    pub fn classify(&self, user: &UserRecord, now: DateTime<Utc>) -> UpdateDecision {
        if self.needs_immediate_update(user) {
            UpdateDecision::Immediate
        } else if self.needs_scheduled_update(user, now) {
            UpdateDecision::Scheduled
        } else {
            UpdateDecision::UpToDate
        }
    }

    /// Content age check used before messaging; ignores tier and preferences.
    pub fn is_content_stale(&self, user: &UserRecord, now: DateTime<Utc>) -> bool {
        user.last_job
            .map_or(true, |last_job| last_job < now - self.refresh_window)
    }
}

fn preferences_changed_since(user: &UserRecord, last_job: DateTime<Utc>) -> bool {
    user.preference_update
        .is_some_and(|changed| changed > last_job)
}

/// Outbound-message cooldown, independent of the content refresh window.
#[derive(Debug, Clone, Copy)]
pub struct MessagingPolicy {
    cooldown: Duration,
}

impl MessagingPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(Duration::hours(hours as i64))
    }

    pub fn cooldown_elapsed(&self, user: &UserRecord, now: DateTime<Utc>) -> bool {
        user.tele_last_sent
            .map_or(true, |sent| sent < now - self.cooldown)
    }

    /// Whether a digest should go out now. `initial` bypasses the cooldown.
    pub fn is_send_due(&self, user: &UserRecord, now: DateTime<Utc>, initial: bool) -> bool {
        if !user.is_pro || user.messaging_id.is_none() {
            return false;
        }
        if user.deliverable_content().is_empty() {
            return false;
        }
        initial || self.cooldown_elapsed(user, now)
    }
}
