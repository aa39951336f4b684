//! Reentrant distributed lock over a CoordinationStore.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::ports::CoordinationStore;

/// Tuning knobs for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Store-side time-to-live for a held lock key. A crashed holder
    /// releases its keys when this expires.
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
        }
    }
}

/// A reentrant mutual-exclusion lock shared through the store.
///
/// One `ReentrantLock` value is one execution context: nested code paths in
/// that context may lock the same key repeatedly and pay no store
/// round-trip after the first acquisition. `&mut self` on `lock`/`unlock`
/// keeps a handle from being shared across tasks without external
/// synchronization; give each context its own handle over a shared store.
///
/// Known limits, inherited from the store representation:
/// - The store key carries no owner identity. Unlock discipline is local
///   bookkeeping only, so callers must pair lock/unlock within one context;
///   nothing store-side stops a foreign delete.
/// - A held key expires after [`LockConfig::ttl`] even while the holder is
///   alive, at which point a second context can acquire it. Keep critical
///   sections short relative to the TTL.
///
/// `lock` never blocks. Callers that want to wait retry on their own
/// schedule.
///
/// # Example
/// ```ignore
/// let mut lock = ReentrantLock::new(store, LockConfig::default());
/// if lock.lock("reports:nightly").await? {
///     // ... critical section, may re-lock("reports:nightly") ...
///     lock.unlock("reports:nightly").await?;
/// }
/// ```
pub struct ReentrantLock<S> {
    store: Arc<S>,
    config: LockConfig,
    /// Hold counts for keys this context currently owns.
    holds: HashMap<String, u32>,
}

impl<S: CoordinationStore> ReentrantLock<S> {
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            holds: HashMap::new(),
        }
    }

    /// Try to acquire `key`. Returns false if another context holds it.
    ///
    /// Re-acquiring a key this context already holds only bumps the local
    /// count; the store is not consulted again.
    pub async fn lock(&mut self, key: &str) -> Result<bool, StoreError> {
        if let Some(count) = self.holds.get_mut(key) {
            *count += 1;
            return Ok(true);
        }

        let acquired = self.store.set_if_absent(key, "", self.config.ttl).await?;
        if acquired {
            self.holds.insert(key.to_string(), 1);
        }
        Ok(acquired)
    }

    /// Release one hold on `key`. Returns false for a key this context does
    /// not hold (an unbalanced unlock); the store is left untouched then.
    ///
    /// The store key is deleted only when the last hold is released. If
    /// that delete fails, the local context has already released and the
    /// key falls back to dying by TTL.
    pub async fn unlock(&mut self, key: &str) -> Result<bool, StoreError> {
        let Some(count) = self.holds.get_mut(key) else {
            return Ok(false);
        };

        *count -= 1;
        if *count == 0 {
            self.holds.remove(key);
            self.store.delete(key).await?;
        }
        Ok(true)
    }

    /// How many holds this context has on `key` (0 when not held).
    pub fn hold_count(&self, key: &str) -> u32 {
        self.holds.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::impls::InMemoryStore;

    fn test_lock(store: &Arc<InMemoryStore>) -> ReentrantLock<InMemoryStore> {
        ReentrantLock::new(Arc::clone(store), LockConfig::default())
    }

    #[tokio::test]
    async fn lock_twice_unlock_twice_releases_the_key() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = test_lock(&store);

        let results = vec![
            lock.lock("job").await.unwrap(),
            lock.lock("job").await.unwrap(),
            lock.unlock("job").await.unwrap(),
            lock.unlock("job").await.unwrap(),
        ];

        assert_eq!(results, vec![true, true, true, true]);
        assert_eq!(store.get("job").await, None);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[tokio::test]
    async fn n_locks_need_n_unlocks(#[case] depth: u32) {
        let store = Arc::new(InMemoryStore::new());
        let mut holder = test_lock(&store);
        let mut rival = test_lock(&store);

        for _ in 0..depth {
            assert!(holder.lock("job").await.unwrap());
        }
        assert_eq!(holder.hold_count("job"), depth);

        // every unlock but the last keeps the key held
        for _ in 0..depth - 1 {
            assert!(holder.unlock("job").await.unwrap());
            assert!(!rival.lock("job").await.unwrap());
        }

        assert!(holder.unlock("job").await.unwrap());
        assert_eq!(holder.hold_count("job"), 0);
        assert_eq!(store.get("job").await, None);

        // now another context can take it
        assert!(rival.lock("job").await.unwrap());
    }

    #[tokio::test]
    async fn second_context_is_excluded_while_held() {
        let store = Arc::new(InMemoryStore::new());
        let mut a = test_lock(&store);
        let mut b = test_lock(&store);

        assert!(a.lock("job").await.unwrap());
        assert!(!b.lock("job").await.unwrap());

        // the failed attempt must not leave B believing it holds anything
        assert_eq!(b.hold_count("job"), 0);
        assert!(!b.unlock("job").await.unwrap());
    }

    #[tokio::test]
    async fn unbalanced_unlock_is_rejected_and_mutates_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut a = test_lock(&store);
        let mut b = test_lock(&store);

        assert!(a.lock("job").await.unwrap());

        // B never locked "job"; its unlock must not delete A's key
        assert!(!b.unlock("job").await.unwrap());
        assert!(store.get("job").await.is_some());

        assert!(a.unlock("job").await.unwrap());
        assert_eq!(store.get("job").await, None);
    }

    #[tokio::test]
    async fn independent_keys_do_not_interfere() {
        let store = Arc::new(InMemoryStore::new());
        let mut a = test_lock(&store);
        let mut b = test_lock(&store);

        assert!(a.lock("left").await.unwrap());
        assert!(b.lock("right").await.unwrap());

        assert!(a.unlock("left").await.unwrap());
        assert!(b.unlock("right").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expiry_admits_a_second_holder() {
        let store = Arc::new(InMemoryStore::new());
        let mut a = ReentrantLock::new(
            Arc::clone(&store),
            LockConfig {
                ttl: Duration::from_millis(20),
            },
        );
        let mut b = test_lock(&store);

        assert!(a.lock("job").await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A still believes it holds the lock, but the key has expired,
        // so B gets in. This is the documented TTL hazard.
        assert_eq!(a.hold_count("job"), 1);
        assert!(b.lock("job").await.unwrap());
    }
}
