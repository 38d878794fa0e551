use crate::server::metrics;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Users with a delayed first digest waiting to go out.
#[derive(Debug, Clone, Default)]
pub struct InitialSendTracker {
    pending: Arc<Mutex<HashSet<String>>>,
}

impl InitialSendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.keys().len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    /// Returns false when a send is already pending for `key`.
    pub(crate) fn insert(&self, key: &str) -> bool {
        let mut keys = self.keys();
        let inserted = keys.insert(key.to_string());
        metrics::set_pending_initial_sends(keys.len());
        inserted
    }

    pub(crate) fn remove(&self, key: &str) {
        let mut keys = self.keys();
        keys.remove(key);
        metrics::set_pending_initial_sends(keys.len());
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
