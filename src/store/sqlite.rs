use super::row::{decode_rows, UserRow, USER_COLUMNS};
use super::schema::USER_VERSIONED_SCHEMAS;
use super::{StoreError, UserQuery, UserStore, USERS_TABLE};
use crate::model::{format_timestamp, UserRecord, UserUpdate};
use crate::server::metrics;
use crate::sqlite_persistence::open_versioned;
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// User table in a local SQLite file.
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), USER_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts or replaces a full user row. Rows are normally created by the
    /// product front-end; this exists for local runs and tests.
    pub fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (user_email, preferences, ispro, telegramid, preference_update) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                USERS_TABLE
            ),
            params![
                user.key,
                user.preferences.to_json().to_string(),
                user.is_pro as i64,
                user.messaging_id,
                user.preference_update.as_ref().map(format_timestamp),
            ],
        )?;
        Self::update_row(&conn, &user.key, &UserUpdate::from_record(user))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))
    }

    fn select_sql(filter: &str) -> String {
        format!(
            "SELECT {} FROM {} WHERE {}",
            USER_COLUMNS.join(", "),
            USERS_TABLE,
            filter
        )
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
        let preferences = row
            .get::<_, Option<String>>("preferences")?
            .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)));
        Ok(UserRow {
            user_email: row.get("user_email")?,
            preferences,
            ispro: row.get::<_, Option<i64>>("ispro")?.map(|v| v != 0),
            watchlist: row.get("watchlist")?,
            sector: row.get("sector")?,
            narrative: row.get("narrative")?,
            watchlist_intel: row.get("watchlist_intel")?,
            watchlist_social: row.get("watchlist_social")?,
            sector_intel: row.get("sector_intel")?,
            sector_social: row.get("sector_social")?,
            narrative_intel: row.get("narrative_intel")?,
            narrative_social: row.get("narrative_social")?,
            last_job: row.get("last_job")?,
            preference_update: row.get("preference_update")?,
            ai_last_update: row.get("ai_last_update")?,
            tele_last_sent: row.get("tele_last_sent")?,
            telegramid: row.get::<_, Option<String>>("telegramid")?.map(Value::String),
            telegram_initial_send_scheduled_at: row.get("telegram_initial_send_scheduled_at")?,
        })
    }

    fn query_users(conn: &Connection, query: UserQuery) -> Result<Vec<UserRecord>, StoreError> {
        let filter = match query {
            UserQuery::ProUsers => "ispro = 1",
            UserQuery::ProUsersWithMessaging => {
                "ispro = 1 AND telegramid IS NOT NULL AND telegramid != ''"
            }
        };
        let mut stmt = conn.prepare(&Self::select_sql(filter))?;
        let rows = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decode_rows(rows))
    }

    fn query_user(conn: &Connection, key: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = conn
            .query_row(
                &Self::select_sql("user_email = ?1"),
                params![key],
                Self::row_to_user,
            )
            .optional()?;
        row.map(UserRow::into_record).transpose()
    }

    fn update_row(conn: &Connection, key: &str, update: &UserUpdate) -> Result<(), StoreError> {
        let columns = update.to_columns();
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE user_email = ?{}",
            USERS_TABLE,
            assignments.join(", "),
            columns.len() + 1
        );
        let values = columns
            .iter()
            .map(|(_, value)| value.as_str())
            .chain(std::iter::once(key));
        let changed = conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(StoreError::Rejected(format!("no user with key {}", key)));
        }
        Ok(())
    }

    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))
        .and_then(|inner| inner);
        metrics::record_collaborator_request("sqlite", operation, result.is_ok(), started.elapsed());
        result
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn fetch_users(&self, query: UserQuery) -> Result<Vec<UserRecord>, StoreError> {
        self.blocking("fetch_users", move |conn| Self::query_users(conn, query))
            .await
    }

    async fn fetch_user(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        let key = key.to_string();
        self.blocking("fetch_user", move |conn| Self::query_user(conn, &key))
            .await
    }

    async fn apply_update(&self, key: &str, update: &UserUpdate) -> Result<(), StoreError> {
        let key = key.to_string();
        let update = update.clone();
        self.blocking("apply_update", move |conn| {
            Self::update_row(conn, &key, &update)
        })
        .await
    }
}
