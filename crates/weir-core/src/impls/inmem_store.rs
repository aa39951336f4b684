//! In-memory CoordinationStore implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::CoordinationStore;

/// A plain value with an optional expiry.
struct ValueEntry {
    value: String,
    expires_at_ms: Option<u64>,
}

#[derive(Default)]
struct StoreState {
    /// Scored sets: set key -> member -> score (epoch ms).
    scored: HashMap<String, HashMap<String, u64>>,

    /// Plain keys. Expiry is lazy: entries past their TTL are dropped by
    /// the next access instead of a background sweeper.
    values: HashMap<String, ValueEntry>,
}

impl StoreState {
    /// Drop `key` if its TTL has passed. Returns whether a live entry remains.
    fn purge_expired(&mut self, key: &str, now_ms: u64) -> bool {
        match self.values.get(key) {
            Some(entry) => {
                if entry.expires_at_ms.is_some_and(|at| at <= now_ms) {
                    self.values.remove(key);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }
}

/// In-memory store for unit tests and single-process development.
///
/// The process clock is the store clock here, and all state sits behind one
/// async mutex, so every trait method is trivially atomic. Nothing persists
/// past the value being dropped.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    fn clock_ms() -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    /// Current value at `key`, if present and not expired (for testing).
    #[cfg(test)]
    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Self::clock_ms();
        let mut state = self.state.lock().await;
        if !state.purge_expired(key, now) {
            return None;
        }
        state.values.get(key).map(|entry| entry.value.clone())
    }

    /// Number of members currently in the scored set (for testing).
    #[cfg(test)]
    pub async fn scored_len(&self, set_key: &str) -> usize {
        let state = self.state.lock().await;
        state.scored.get(set_key).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn insert_scored(
        &self,
        set_key: &str,
        member: &str,
        score_ms: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .scored
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string(), score_ms);
        Ok(())
    }

    async fn range_by_score(
        &self,
        set_key: &str,
        min_ms: u64,
        max_ms: u64,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let Some(members) = state.scored.get(set_key) else {
            return Ok(Vec::new());
        };
        // HashMap iteration order is arbitrary, which matches the contract:
        // any eligible member may come back first.
        Ok(members
            .iter()
            .filter(|&(_, &score)| min_ms <= score && score <= max_ms)
            .take(limit)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(members) = state.scored.get_mut(set_key) else {
            return Ok(false);
        };
        let removed = members.remove(member).is_some();
        if members.is_empty() {
            state.scored.remove(set_key);
        }
        Ok(removed)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Self::clock_ms();
        let mut state = self.state.lock().await;
        if state.purge_expired(key, now) {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at_ms: Some(now + ttl.as_millis() as u64),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.values.remove(key);
        Ok(())
    }

    async fn now_ms(&self) -> Result<u64, StoreError> {
        Ok(Self::clock_ms())
    }
}
