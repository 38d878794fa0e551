//! Persistence collaborator.
//!
//! The worker reads batches of pro-tier users and writes partial updates
//! keyed by the user's email. Three backends share the [`UserStore`] trait:
//! the hosted REST table used in production, a local SQLite file, and an
//! in-memory map for tests and dry runs.

mod memory;
mod rest;
mod row;
mod schema;
mod sqlite;

pub use memory::InMemoryUserStore;
pub use rest::RestUserStore;
pub use sqlite::SqliteUserStore;

use crate::model::{UserRecord, UserUpdate};
use async_trait::async_trait;
use thiserror::Error;

/// Table holding one row per user.
pub const USERS_TABLE: &str = "user_preferences";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode user row: {0}")]
    Decode(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Connection(err.to_string())
        }
    }
}

/// Which users a cycle wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserQuery {
    ProUsers,
    /// Pro users that linked a messaging chat.
    ProUsersWithMessaging,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch_users(&self, query: UserQuery) -> Result<Vec<UserRecord>, StoreError>;

    async fn fetch_user(&self, key: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Applies a partial update in one write.
    async fn apply_update(&self, key: &str, update: &UserUpdate) -> Result<(), StoreError>;
}
