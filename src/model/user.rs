use super::category::{Category, ContentSlot};
use super::content::ContentField;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// The three item lists a user subscribes to.
///
/// Parsing is lenient: anything that is not an object (or an object whose
/// lists are not arrays of strings) yields empty lists instead of an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub watchlist: Vec<String>,
    pub sectors: Vec<String>,
    pub narratives: Vec<String>,
}

impl Preferences {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let list = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|k| map.get(*k))
                        .map(parse_items)
                        .unwrap_or_default()
                };
                Self {
                    watchlist: list(&["watchlist"]),
                    sectors: list(&["sectors", "sector"]),
                    narratives: list(&["narratives", "narrative"]),
                }
            }
            // json columns exposed as text arrive double-encoded
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(inner @ Value::Object(_)) => Self::from_json(&inner),
                _ => Self::default(),
            },
            _ => Self::default(),
        }
    }

    pub fn items(&self, category: Category) -> &[String] {
        match category {
            Category::Watchlist => &self.watchlist,
            Category::Sector => &self.sectors,
            Category::Narrative => &self.narratives,
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.items(*c).is_empty())
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "watchlist": self.watchlist,
            "sectors": self.sectors,
            "narratives": self.narratives,
        })
    }
}

fn parse_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Stored fields of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryContent {
    pub exposed: Option<ContentField>,
    pub intel: Option<ContentField>,
    pub social: Option<ContentField>,
}

impl CategoryContent {
    pub fn slot(&self, slot: ContentSlot) -> Option<&ContentField> {
        match slot {
            ContentSlot::Exposed => self.exposed.as_ref(),
            ContentSlot::Intel => self.intel.as_ref(),
            ContentSlot::Social => self.social.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: ContentSlot) -> &mut Option<ContentField> {
        match slot {
            ContentSlot::Exposed => &mut self.exposed,
            ContentSlot::Intel => &mut self.intel,
            ContentSlot::Social => &mut self.social,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContent {
    pub watchlist: CategoryContent,
    pub sector: CategoryContent,
    pub narrative: CategoryContent,
}

impl UserContent {
    pub fn get(&self, category: Category) -> &CategoryContent {
        match category {
            Category::Watchlist => &self.watchlist,
            Category::Sector => &self.sector,
            Category::Narrative => &self.narrative,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryContent {
        match category {
            Category::Watchlist => &mut self.watchlist,
            Category::Sector => &mut self.sector,
            Category::Narrative => &mut self.narrative,
        }
    }
}

/// Projection of a user row as the worker sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique user key (the account email).
    pub key: String,
    pub is_pro: bool,
    pub preferences: Preferences,
    pub content: UserContent,
    pub last_job: Option<DateTime<Utc>>,
    pub preference_update: Option<DateTime<Utc>>,
    pub ai_last_update: Option<DateTime<Utc>>,
    pub tele_last_sent: Option<DateTime<Utc>>,
    /// Outbound messaging chat id, when the user linked one.
    pub messaging_id: Option<String>,
    pub initial_send_scheduled_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn exposed(&self, category: Category) -> Option<&ContentField> {
        self.content.get(category).exposed.as_ref()
    }

    /// Categories whose exposed field holds substantive text, in category order.
    pub fn deliverable_content(&self) -> Vec<(Category, String)> {
        Category::ALL
            .iter()
            .filter_map(|c| {
                self.exposed(*c)
                    .and_then(ContentField::text)
                    .map(|text| (*c, text.to_string()))
            })
            .collect()
    }
}

/// Partial write applied to one user row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub content: BTreeMap<(Category, ContentSlot), ContentField>,
    pub last_job: Option<DateTime<Utc>>,
    pub ai_last_update: Option<DateTime<Utc>>,
    pub tele_last_sent: Option<DateTime<Utc>>,
    pub initial_send_scheduled_at: Option<DateTime<Utc>>,
}

impl UserUpdate {
    pub fn set_content(&mut self, category: Category, slot: ContentSlot, field: ContentField) {
        self.content.insert((category, slot), field);
    }

    /// Every stored field of `user` that an update can carry.
    pub fn from_record(user: &UserRecord) -> Self {
        let mut update = Self {
            last_job: user.last_job,
            ai_last_update: user.ai_last_update,
            tele_last_sent: user.tele_last_sent,
            initial_send_scheduled_at: user.initial_send_scheduled_at,
            ..Default::default()
        };
        for category in Category::ALL {
            for slot in [ContentSlot::Exposed, ContentSlot::Intel, ContentSlot::Social] {
                if let Some(field) = user.content.get(category).slot(slot) {
                    update.set_content(category, slot, field.clone());
                }
            }
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.last_job.is_none()
            && self.ai_last_update.is_none()
            && self.tele_last_sent.is_none()
            && self.initial_send_scheduled_at.is_none()
    }

    /// Column/value pairs in storage encoding, content columns first.
    pub fn to_columns(&self) -> Vec<(&'static str, String)> {
        let mut columns: Vec<(&'static str, String)> = self
            .content
            .iter()
            .map(|((category, slot), field)| (category.column(*slot), field.to_storage()))
            .collect();
        let timestamps = [
            ("last_job", self.last_job),
            ("ai_last_update", self.ai_last_update),
            ("tele_last_sent", self.tele_last_sent),
            (
                "telegram_initial_send_scheduled_at",
                self.initial_send_scheduled_at,
            ),
        ];
        for (column, value) in timestamps {
            if let Some(ts) = value {
                columns.push((column, format_timestamp(&ts)));
            }
        }
        columns
    }

    pub fn apply_to(&self, user: &mut UserRecord) {
        for ((category, slot), field) in &self.content {
            *user.content.get_mut(*category).slot_mut(*slot) = Some(field.clone());
        }
        if self.last_job.is_some() {
            user.last_job = self.last_job;
        }
        if self.ai_last_update.is_some() {
            user.ai_last_update = self.ai_last_update;
        }
        if self.tele_last_sent.is_some() {
            user.tele_last_sent = self.tele_last_sent;
        }
        if self.initial_send_scheduled_at.is_some() {
            user.initial_send_scheduled_at = self.initial_send_scheduled_at;
        }
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 as well as zone-less timestamps (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_preferences_accept_singular_and_plural_keys() {
        let prefs = Preferences::from_json(&json!({
            "watchlist": ["BTC", " ETH ", ""],
            "sector": ["DeFi"],
            "narratives": ["AI agents"]
        }));
        assert_eq!(prefs.watchlist, vec!["BTC", "ETH"]);
        assert_eq!(prefs.sectors, vec!["DeFi"]);
        assert_eq!(prefs.narratives, vec!["AI agents"]);
    }

    #[test]
    fn test_malformed_preferences_are_empty() {
        assert!(Preferences::from_json(&json!("not an object")).is_empty());
        assert!(Preferences::from_json(&json!([1, 2, 3])).is_empty());
        assert!(Preferences::from_json(&Value::Null).is_empty());
        let prefs = Preferences::from_json(&json!({"watchlist": "BTC", "sector": [1, "L2"]}));
        assert!(prefs.watchlist.is_empty());
        assert_eq!(prefs.sectors, vec!["L2"]);
    }

    #[test]
    fn test_preferences_double_encoded() {
        let prefs = Preferences::from_json(&json!("{\"watchlist\":[\"SOL\"]}"));
        assert_eq!(prefs.watchlist, vec!["SOL"]);
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut user = UserRecord::new("a@b.c");
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        user.tele_last_sent = Some(earlier);

        let mut update = UserUpdate::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        update.last_job = Some(now);
        update.set_content(
            Category::Sector,
            ContentSlot::Exposed,
            ContentField::Placeholder,
        );
        update.apply_to(&mut user);

        assert_eq!(user.last_job, Some(now));
        assert_eq!(user.tele_last_sent, Some(earlier));
        assert_eq!(
            user.exposed(Category::Sector),
            Some(&ContentField::Placeholder)
        );
    }

    #[test]
    fn test_update_columns() {
        let mut update = UserUpdate::default();
        update.set_content(
            Category::Narrative,
            ContentSlot::Intel,
            ContentField::Content("x".into()),
        );
        update.last_job = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let columns = update.to_columns();
        assert_eq!(
            columns,
            vec![
                ("narrative_intel", "x".to_string()),
                ("last_job", "2024-05-01T10:00:00.000Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_deliverable_content_skips_markers() {
        let mut user = UserRecord::new("a@b.c");
        user.content.watchlist.exposed = Some(ContentField::Content("BTC up".into()));
        user.content.sector.exposed = Some(ContentField::Placeholder);
        user.content.narrative.exposed = Some(ContentField::error("x"));
        assert_eq!(
            user.deliverable_content(),
            vec![(Category::Watchlist, "BTC up".to_string())]
        );
    }
}
