//! Users, channel maps and settings shared by the integration tests.

use super::constants::*;
use chrono::{Duration as ChronoDuration, Utc};
use digest_worker::clients::ChannelRef;
use digest_worker::config::{PipelineSettings, ScheduleSettings};
use digest_worker::model::{Category, ContentField, Preferences, UserRecord};
use digest_worker::pipeline::{CategoryChannels, ChannelMap, Granularity};
use std::time::Duration;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A pro user who has never been processed.
pub fn pro_user(key: &str, watchlist: &[&str], sectors: &[&str], narratives: &[&str]) -> UserRecord {
    let mut user = UserRecord::new(key);
    user.is_pro = true;
    user.preferences = Preferences {
        watchlist: strings(watchlist),
        sectors: strings(sectors),
        narratives: strings(narratives),
    };
    user
}

/// A pro user whose content was generated `hours_ago` and is otherwise complete.
pub fn processed_user(key: &str, watchlist: &[&str], hours_ago: i64) -> UserRecord {
    let mut user = pro_user(key, watchlist, &[], &[]);
    let at = Utc::now() - ChronoDuration::hours(hours_ago);
    user.last_job = Some(at);
    user.preference_update = Some(at - ChronoDuration::minutes(5));
    for category in Category::ALL {
        let field = if category == Category::Watchlist {
            ContentField::Content(format!("Old {} news", category.label()))
        } else {
            ContentField::Placeholder
        };
        user.content.get_mut(category).exposed = Some(field.clone());
        user.content.get_mut(category).intel = Some(field);
    }
    user
}

/// Same as [`processed_user`] but with every category holding real text.
pub fn fully_processed_user(key: &str, hours_ago: i64) -> UserRecord {
    let mut user = processed_user(key, &["BTC"], hours_ago);
    for category in Category::ALL {
        let field = ContentField::Content(format!("Old {} news", category.label()));
        user.content.get_mut(category).exposed = Some(field.clone());
        user.content.get_mut(category).intel = Some(field);
    }
    user
}

pub fn linked(mut user: UserRecord, chat_id: &str) -> UserRecord {
    user.messaging_id = Some(chat_id.to_string());
    user
}

pub fn intel_channels() -> ChannelMap {
    ChannelMap {
        watchlist: CategoryChannels::intel_only(ChannelRef::new(WATCHLIST_WORKSPACE, AGENT_ID)),
        sector: CategoryChannels::intel_only(ChannelRef::new(SECTOR_WORKSPACE, AGENT_ID)),
        narrative: CategoryChannels::intel_only(ChannelRef::new(NARRATIVE_WORKSPACE, AGENT_ID)),
    }
}

/// Intel everywhere plus a social channel for the watchlist.
pub fn social_channels() -> ChannelMap {
    let mut channels = intel_channels();
    channels.watchlist.social = Some(ChannelRef::new(WATCHLIST_SOCIAL_WORKSPACE, AGENT_ID));
    channels
}

pub fn messaging_channel() -> ChannelRef {
    ChannelRef::new(MESSAGING_WORKSPACE, MESSAGING_AGENT_ID)
}

/// Sequential, no settle wait, one task per item.
pub fn fast_pipeline() -> PipelineSettings {
    PipelineSettings {
        refresh_hours: 6,
        settle_wait: Duration::ZERO,
        concurrency: 1,
        granularity: Granularity::PerItem,
        exclusive_channels: true,
    }
}

pub fn fast_schedule() -> ScheduleSettings {
    ScheduleSettings {
        scheduled_refresh_interval: Duration::from_millis(100),
        immediate_check_interval: Duration::from_millis(20),
        message_interval: Duration::from_millis(20),
        initial_send_delay: INITIAL_SEND_DELAY,
        shutdown_grace: Duration::from_millis(200),
        ..Default::default()
    }
}
