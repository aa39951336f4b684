//! CoordinationStore port - the storage capability set.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// The narrow store interface the queue and the lock are built on.
///
/// Design intent:
/// - Each method is ONE atomic operation on the store. Correctness across
///   processes leans entirely on that per-call atomicity; there are no
///   compound transactions, callers sequence single calls and tolerate
///   interleaving between them.
/// - `now_ms` is the store's own clock. All scores and visibility checks
///   use it, so producer and consumer hosts never need synchronized clocks.
/// - Implementations must be safe to share (`Send + Sync`) and safe to call
///   concurrently; one store value typically backs many queues and locks.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Add `member` to the scored set at `set_key` with the given score
    /// (epoch milliseconds). Re-adding an existing member updates its score.
    async fn insert_scored(
        &self,
        set_key: &str,
        member: &str,
        score_ms: u64,
    ) -> Result<(), StoreError>;

    /// Members of the scored set whose score lies in `[min_ms, max_ms]`,
    /// at most `limit` of them. Order within the range is not part of the
    /// contract.
    async fn range_by_score(
        &self,
        set_key: &str,
        min_ms: u64,
        max_ms: u64,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove `member` from the scored set. Returns true iff this call
    /// removed it; false means somebody else already did, or it was never
    /// there. For one member, at most one caller ever sees true. This is
    /// the claim arbiter.
    async fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError>;

    /// Set `key` to `value` only if the key is absent, with a time-to-live.
    /// Returns true on success, false if the key already exists. Presence
    /// check, write and TTL land in one atomic step.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// The store's current time in epoch milliseconds.
    async fn now_ms(&self) -> Result<u64, StoreError>;
}
