use super::StoreError;
use crate::model::{
    parse_timestamp, Category, ContentField, ContentSlot, Preferences, UserContent, UserRecord,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Columns every backend projects, in storage order.
pub(crate) const USER_COLUMNS: &[&str] = &[
    "user_email",
    "preferences",
    "ispro",
    "watchlist",
    "sector",
    "narrative",
    "watchlist_intel",
    "watchlist_social",
    "sector_intel",
    "sector_social",
    "narrative_intel",
    "narrative_social",
    "last_job",
    "preference_update",
    "ai_last_update",
    "tele_last_sent",
    "telegramid",
    "telegram_initial_send_scheduled_at",
];

/// Raw row as stored, before any interpretation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UserRow {
    pub user_email: Option<String>,
    pub preferences: Option<Value>,
    pub ispro: Option<bool>,
    pub watchlist: Option<String>,
    pub sector: Option<String>,
    pub narrative: Option<String>,
    pub watchlist_intel: Option<String>,
    pub watchlist_social: Option<String>,
    pub sector_intel: Option<String>,
    pub sector_social: Option<String>,
    pub narrative_intel: Option<String>,
    pub narrative_social: Option<String>,
    pub last_job: Option<String>,
    pub preference_update: Option<String>,
    pub ai_last_update: Option<String>,
    pub tele_last_sent: Option<String>,
    pub telegramid: Option<Value>,
    pub telegram_initial_send_scheduled_at: Option<String>,
}

impl UserRow {
    fn content_column(&self, category: Category, slot: ContentSlot) -> Option<&str> {
        let raw = match category.column(slot) {
            "watchlist" => &self.watchlist,
            "sector" => &self.sector,
            "narrative" => &self.narrative,
            "watchlist_intel" => &self.watchlist_intel,
            "watchlist_social" => &self.watchlist_social,
            "sector_intel" => &self.sector_intel,
            "sector_social" => &self.sector_social,
            "narrative_intel" => &self.narrative_intel,
            "narrative_social" => &self.narrative_social,
            _ => return None,
        };
        raw.as_deref()
    }

    pub fn into_record(self) -> Result<UserRecord, StoreError> {
        let key = self
            .user_email
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StoreError::Decode("row without user_email".to_string()))?;

        let mut content = UserContent::default();
        for category in Category::ALL {
            let stored = content.get_mut(category);
            for slot in [ContentSlot::Exposed, ContentSlot::Intel, ContentSlot::Social] {
                *stored.slot_mut(slot) =
                    ContentField::from_storage(self.content_column(category, slot));
            }
        }

        let timestamp = |column: &str, raw: &Option<String>| decode_timestamp(&key, column, raw);

        let last_job = timestamp("last_job", &self.last_job);
        let preference_update = timestamp("preference_update", &self.preference_update);
        let ai_last_update = timestamp("ai_last_update", &self.ai_last_update);
        let tele_last_sent = timestamp("tele_last_sent", &self.tele_last_sent);
        let initial_send_scheduled_at = timestamp(
            "telegram_initial_send_scheduled_at",
            &self.telegram_initial_send_scheduled_at,
        );

        Ok(UserRecord {
            key,
            is_pro: self.ispro.unwrap_or(false),
            preferences: self
                .preferences
                .as_ref()
                .map(Preferences::from_json)
                .unwrap_or_default(),
            content,
            last_job,
            preference_update,
            ai_last_update,
            tele_last_sent,
            messaging_id: self.telegramid.as_ref().and_then(messaging_id),
            initial_send_scheduled_at,
        })
    }
}

/// Decodes a batch, logging and dropping rows that cannot become a user.
pub(crate) fn decode_rows(rows: Vec<UserRow>) -> Vec<UserRecord> {
    rows.into_iter()
        .filter_map(|row| match row.into_record() {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Skipping undecodable user row: {}", e);
                None
            }
        })
        .collect()
}

fn decode_timestamp(key: &str, column: &str, raw: &Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw.as_deref()?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() && !raw.trim().is_empty() {
        warn!("Unparseable {} for {}: {:?}, treating as unset", column, key, raw);
    }
    parsed
}

/// Chat ids come back as numbers or strings depending on the column type.
fn messaging_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
