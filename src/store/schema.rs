//! SQLite schema of the local user table.

use super::USERS_TABLE;
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 1 - Users, preferences and generated content
// =============================================================================

const USERS_TABLE_V1: Table = Table {
    name: USERS_TABLE,
    columns: &[
        sqlite_column!("user_email", &SqlType::Text, is_primary_key = true),
        sqlite_column!("preferences", &SqlType::Text),
        sqlite_column!("ispro", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("watchlist", &SqlType::Text),
        sqlite_column!("sector", &SqlType::Text),
        sqlite_column!("narrative", &SqlType::Text),
        sqlite_column!("watchlist_intel", &SqlType::Text),
        sqlite_column!("watchlist_social", &SqlType::Text),
        sqlite_column!("sector_intel", &SqlType::Text),
        sqlite_column!("sector_social", &SqlType::Text),
        sqlite_column!("narrative_intel", &SqlType::Text),
        sqlite_column!("narrative_social", &SqlType::Text),
        sqlite_column!("last_job", &SqlType::Text),
        sqlite_column!("preference_update", &SqlType::Text),
        sqlite_column!("ai_last_update", &SqlType::Text),
        sqlite_column!("tele_last_sent", &SqlType::Text),
        sqlite_column!("telegramid", &SqlType::Text),
    ],
    indices: &[("idx_user_preferences_ispro", "ispro")],
};

// =============================================================================
// Version 2 - Initial messaging send bookkeeping
// =============================================================================

const USERS_TABLE_V2: Table = Table {
    name: USERS_TABLE,
    columns: &[
        sqlite_column!("user_email", &SqlType::Text, is_primary_key = true),
        sqlite_column!("preferences", &SqlType::Text),
        sqlite_column!("ispro", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("watchlist", &SqlType::Text),
        sqlite_column!("sector", &SqlType::Text),
        sqlite_column!("narrative", &SqlType::Text),
        sqlite_column!("watchlist_intel", &SqlType::Text),
        sqlite_column!("watchlist_social", &SqlType::Text),
        sqlite_column!("sector_intel", &SqlType::Text),
        sqlite_column!("sector_social", &SqlType::Text),
        sqlite_column!("narrative_intel", &SqlType::Text),
        sqlite_column!("narrative_social", &SqlType::Text),
        sqlite_column!("last_job", &SqlType::Text),
        sqlite_column!("preference_update", &SqlType::Text),
        sqlite_column!("ai_last_update", &SqlType::Text),
        sqlite_column!("tele_last_sent", &SqlType::Text),
        sqlite_column!("telegramid", &SqlType::Text),
        sqlite_column!("telegram_initial_send_scheduled_at", &SqlType::Text),
    ],
    indices: &[("idx_user_preferences_ispro", "ispro")],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "ALTER TABLE {} ADD COLUMN telegram_initial_send_scheduled_at TEXT",
            USERS_TABLE
        ),
        [],
    )?;
    Ok(())
}

pub(super) const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[USERS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[USERS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
