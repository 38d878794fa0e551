//! Per-user mutual exclusion shared by every cycle.
//!
//! Membership of a key in the registry is the only signal that a user is
//! being processed. Keys are held through [`UserLease`], which releases on
//! drop, so a panic inside the critical section still frees the user.

use crate::server::metrics;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as held. Returns `None` when another worker already holds it.
    pub fn try_acquire(&self, key: &str) -> Option<UserLease> {
        let inserted = self.keys().insert(key.to_string());
        if !inserted {
            debug!("User {} is already being processed", key);
            metrics::record_lock_contention();
            return None;
        }
        Some(UserLease {
            key: key.to_string(),
            registry: self.clone(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    /// Currently held keys, sorted.
    pub fn held_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    fn release(&self, key: &str) {
        self.keys().remove(key);
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        // Set operations cannot leave the set half-updated, so a poisoned
        // lock is still consistent.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scoped hold on one user key.
#[derive(Debug)]
pub struct UserLease {
    key: String,
    registry: LockRegistry,
}

impl UserLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Explicit release; equivalent to dropping the lease.
    pub fn release(self) {}
}

impl Drop for UserLease {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let registry = LockRegistry::new();
        let lease = registry.try_acquire("a@example.com").unwrap();
        assert!(registry.is_held("a@example.com"));
        assert!(registry.try_acquire("a@example.com").is_none());

        // Other keys are independent
        let other = registry.try_acquire("b@example.com");
        assert!(other.is_some());

        lease.release();
        assert!(!registry.is_held("a@example.com"));
        assert!(registry.try_acquire("a@example.com").is_some());
    }

    #[test]
    fn test_concurrent_acquire_exactly_one_wins() {
        let registry = LockRegistry::new();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Keep the lease alive until every thread has tried
                    let lease = registry.try_acquire("shared@example.com");
                    let won = lease.is_some();
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    drop(lease);
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_on_panic() {
        let registry = LockRegistry::new();
        let cloned = registry.clone();
        let result = std::thread::spawn(move || {
            let _lease = cloned.try_acquire("c@example.com").unwrap();
            panic!("processing failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!registry.is_held("c@example.com"));
    }

    #[test]
    fn test_held_keys_sorted() {
        let registry = LockRegistry::new();
        let _b = registry.try_acquire("b").unwrap();
        let _a = registry.try_acquire("a").unwrap();
        assert_eq!(registry.held_keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len(), 2);
    }
}
