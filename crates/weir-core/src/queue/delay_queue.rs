//! DelayQueue: enqueue with a visibility delay, claim by atomic removal.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::PollOutcome;
use crate::domain::{TaskId, TaskItem};
use crate::error::WeirError;
use crate::ports::CoordinationStore;

/// Tuning knobs for a queue and its consumers.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long an idle consumer sleeps before re-polling.
    pub poll_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_backoff: Duration::from_millis(500),
        }
    }
}

/// A delaying task queue bound to one scored set in the store.
///
/// `T` is the caller's payload type; it travels as JSON inside a
/// [`TaskItem`] envelope. Any number of producers and consumers, in any
/// number of processes, may operate on the same queue key at once.
///
/// # Example
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let queue: DelayQueue<String, _> =
///     DelayQueue::new(store, "q-demo", QueueConfig::default());
///
/// queue.enqueue("hello".to_string(), Duration::from_secs(5)).await?;
/// ```
pub struct DelayQueue<T, S> {
    store: Arc<S>,
    queue_key: String,
    config: QueueConfig,
    _payload: PhantomData<T>,
}

impl<T, S> DelayQueue<T, S>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: CoordinationStore,
{
    pub fn new(store: Arc<S>, queue_key: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            store,
            queue_key: queue_key.into(),
            config,
            _payload: PhantomData,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue `payload`, visible to consumers once `delay` has elapsed.
    ///
    /// The visibility timestamp comes from the store clock, not the local
    /// one, so producers on hosts with skewed clocks still delay correctly.
    /// A zero delay makes the task visible immediately.
    pub async fn enqueue(&self, payload: T, delay: Duration) -> Result<(), WeirError> {
        let now_ms = self.store.now_ms().await?;
        let item = TaskItem::new(TaskId::generate_at(now_ms), payload);
        let member = serde_json::to_string(&item)?;
        // delays past u64 millis saturate: the task is "hidden forever",
        // never wrapped around into the visible range
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let visible_at = now_ms.saturating_add(delay_ms);
        self.store
            .insert_scored(&self.queue_key, &member, visible_at)
            .await?;
        Ok(())
    }

    /// One poll-and-claim round.
    ///
    /// Reads the store clock fresh, asks for a single visible member and
    /// tries to remove exactly that member. Removal is the arbiter when
    /// several consumers see the same entry: whoever removes it owns it.
    ///
    /// A `Codec` error means this consumer won the claim but the member did
    /// not parse; the entry is already gone from the store at that point.
    pub async fn poll_once(&self) -> Result<PollOutcome<T>, WeirError> {
        let now_ms = self.store.now_ms().await?;
        let visible = self
            .store
            .range_by_score(&self.queue_key, 0, now_ms, 1)
            .await?;
        let Some(member) = visible.into_iter().next() else {
            return Ok(PollOutcome::Empty);
        };

        // 取れたように見えても、remove に勝った consumer だけが本物の所有者
        if !self.store.remove_member(&self.queue_key, &member).await? {
            return Ok(PollOutcome::Lost);
        }

        let item: TaskItem<T> = serde_json::from_str(&member)?;
        Ok(PollOutcome::Claimed(item))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::error::{StoreError, WeirError};
    use crate::impls::InMemoryStore;

    fn test_queue(store: Arc<InMemoryStore>) -> DelayQueue<String, InMemoryStore> {
        DelayQueue::new(store, "q-test", QueueConfig::default())
    }

    #[tokio::test]
    async fn immediate_task_is_claimed_and_gone() {
        let store = Arc::new(InMemoryStore::new());
        let queue = test_queue(Arc::clone(&store));

        queue
            .enqueue("hello".to_string(), Duration::ZERO)
            .await
            .unwrap();

        let PollOutcome::Claimed(item) = queue.poll_once().await.unwrap() else {
            panic!("expected a claim");
        };
        assert_eq!(item.payload(), "hello");

        assert!(matches!(
            queue.poll_once().await.unwrap(),
            PollOutcome::Empty
        ));
        assert_eq!(store.scored_len("q-test").await, 0);
    }

    #[rstest]
    #[case(150)]
    #[case(400)]
    #[tokio::test]
    async fn task_stays_hidden_until_the_delay_elapses(#[case] delay_ms: u64) {
        let store = Arc::new(InMemoryStore::new());
        let queue = test_queue(Arc::clone(&store));

        queue
            .enqueue("slow".to_string(), Duration::from_millis(delay_ms))
            .await
            .unwrap();

        assert!(matches!(
            queue.poll_once().await.unwrap(),
            PollOutcome::Empty
        ));

        tokio::time::sleep(Duration::from_millis(delay_ms + 60)).await;
        assert!(matches!(
            queue.poll_once().await.unwrap(),
            PollOutcome::Claimed(_)
        ));
    }

    #[tokio::test]
    async fn extreme_delay_saturates_instead_of_wrapping() {
        let store = Arc::new(InMemoryStore::new());
        let queue = test_queue(Arc::clone(&store));

        // a wrapped score would land in [0, now] and leak the task early
        queue
            .enqueue("never".to_string(), Duration::MAX)
            .await
            .unwrap();

        assert_eq!(store.scored_len("q-test").await, 1);
        assert!(matches!(
            queue.poll_once().await.unwrap(),
            PollOutcome::Empty
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_consumers_claim_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(test_queue(Arc::clone(&store)));

        queue
            .enqueue("contested".to_string(), Duration::ZERO)
            .await
            .unwrap();

        let mut joins = Vec::new();
        for _ in 0..8 {
            let q = Arc::clone(&queue);
            joins.push(tokio::spawn(async move { q.poll_once().await.unwrap() }));
        }

        let mut claims = 0;
        for join in joins {
            if let PollOutcome::Claimed(_) = join.await.unwrap() {
                claims += 1;
            }
        }

        assert_eq!(claims, 1);
        assert_eq!(store.scored_len("q-test").await, 0);
    }

    #[tokio::test]
    async fn equal_payloads_are_distinct_tasks() {
        let store = Arc::new(InMemoryStore::new());
        let queue = test_queue(Arc::clone(&store));

        queue
            .enqueue("dup".to_string(), Duration::ZERO)
            .await
            .unwrap();
        queue
            .enqueue("dup".to_string(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.scored_len("q-test").await, 2);

        let PollOutcome::Claimed(first) = queue.poll_once().await.unwrap() else {
            panic!("expected first claim");
        };
        let PollOutcome::Claimed(second) = queue.poll_once().await.unwrap() else {
            panic!("expected second claim");
        };

        assert_ne!(first.id(), second.id());
        assert_eq!(first.payload(), "dup");
        assert_eq!(second.payload(), "dup");
        assert_eq!(store.scored_len("q-test").await, 0);
    }

    /// Store that refuses every operation.
    struct DownStore;

    #[async_trait::async_trait]
    impl CoordinationStore for DownStore {
        async fn insert_scored(&self, _: &str, _: &str, _: u64) -> Result<(), StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
        async fn range_by_score(
            &self,
            _: &str,
            _: u64,
            _: u64,
            _: usize,
        ) -> Result<Vec<String>, StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
        async fn remove_member(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
        async fn now_ms(&self) -> Result<u64, StoreError> {
            Err(StoreError::unavailable("store is down"))
        }
    }

    #[tokio::test]
    async fn store_outage_reaches_the_caller() {
        let queue: DelayQueue<String, DownStore> =
            DelayQueue::new(Arc::new(DownStore), "q-down", QueueConfig::default());

        let err = queue
            .enqueue("lost".to_string(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, WeirError::Store(_)));

        let err = queue.poll_once().await.unwrap_err();
        assert!(matches!(err, WeirError::Store(_)));
    }

    #[tokio::test]
    async fn undecodable_member_is_still_consumed() {
        let store = Arc::new(InMemoryStore::new());
        let queue = test_queue(Arc::clone(&store));

        store.insert_scored("q-test", "not json", 0).await.unwrap();

        let err = queue.poll_once().await.unwrap_err();
        assert!(matches!(err, WeirError::Codec(_)));

        // the losing parse does not resurrect the member
        assert_eq!(store.scored_len("q-test").await, 0);
        assert!(matches!(
            queue.poll_once().await.unwrap(),
            PollOutcome::Empty
        ));
    }
}
