use super::{StoreError, UserQuery, UserStore};
use crate::model::{UserRecord, UserUpdate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Map-backed store for tests and dry runs. Every accepted write is kept in
/// a log so callers can assert on exactly what was persisted.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<BTreeMap<String, UserRecord>>,
    writes: Mutex<Vec<(String, UserUpdate)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::new();
        for user in users {
            store.insert(user);
        }
        store
    }

    pub fn insert(&self, user: UserRecord) {
        lock(&self.users).insert(user.key.clone(), user);
    }

    pub fn get(&self, key: &str) -> Option<UserRecord> {
        lock(&self.users).get(key).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(String, UserUpdate)> {
        lock(&self.writes).clone()
    }

    pub fn writes_for(&self, key: &str) -> Vec<UserUpdate> {
        lock(&self.writes)
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, update)| update.clone())
            .collect()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("reads disabled".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn fetch_users(&self, query: UserQuery) -> Result<Vec<UserRecord>, StoreError> {
        self.check_reads()?;
        Ok(lock(&self.users)
            .values()
            .filter(|u| u.is_pro)
            .filter(|u| query == UserQuery::ProUsers || u.messaging_id.is_some())
            .cloned()
            .collect())
    }

    async fn fetch_user(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check_reads()?;
        Ok(self.get(key))
    }

    async fn apply_update(&self, key: &str, update: &UserUpdate) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("writes disabled".to_string()));
        }
        let mut users = lock(&self.users);
        let user = users
            .get_mut(key)
            .ok_or_else(|| StoreError::Rejected(format!("no user with key {}", key)))?;
        update.apply_to(user);
        lock(&self.writes).push((key.to_string(), update.clone()));
        Ok(())
    }
}
