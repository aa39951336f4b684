//! Consumer group: poll-and-claim workers over a DelayQueue.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{DelayQueue, PollOutcome, TaskHandler};
use crate::error::WeirError;
use crate::ports::CoordinationStore;

/// Consumer group handle.
/// - `request_shutdown()` で全コンシューマが止まる
/// - `shutdown_and_join()` で全コンシューマの終了を待てる
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    /// Spawn `n` consumers against one queue.
    pub fn spawn<T, S>(
        n: usize,
        queue: Arc<DelayQueue<T, S>>,
        handler: Arc<dyn TaskHandler<T>>,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: CoordinationStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for consumer_id in 0..n {
            let q = Arc::clone(&queue);
            let h = Arc::clone(&handler);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                consumer_loop(consumer_id, q, h, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all consumers.
    /// This does not cancel an in-flight handler; consumers stop claiming
    /// new tasks and wake up from their idle backoff.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all consumers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn consumer_loop<T, S>(
    consumer_id: usize,
    queue: Arc<DelayQueue<T, S>>,
    handler: Arc<dyn TaskHandler<T>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: CoordinationStore,
{
    let backoff = queue.config().poll_backoff;

    loop {
        // shutdown が来ていたら抜ける（sender が落ちた場合も含む）
        if *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err() {
            break;
        }

        match queue.poll_once().await {
            Ok(PollOutcome::Claimed(item)) => {
                let task_id = item.id();
                debug!(consumer_id, %task_id, "claimed task");
                if let Err(err) = handler.handle(item.into_payload()).await {
                    // The entry is already removed from the store.
                    // Re-enqueueing is the caller's policy, not ours.
                    warn!(consumer_id, %task_id, %err, "handler failed, task dropped");
                }
            }
            Ok(PollOutcome::Lost) => {
                // 他のコンシューマに取られただけ。すぐ次を見に行く
                continue;
            }
            Ok(PollOutcome::Empty) => {
                idle_backoff(backoff, shutdown_rx).await;
            }
            Err(WeirError::Codec(err)) => {
                // Won the claim, lost the parse. The member is gone either
                // way, so this ends like a handler failure.
                error!(consumer_id, %err, "claimed task failed to decode, dropped");
            }
            Err(err) => {
                warn!(consumer_id, %err, "poll failed, backing off");
                idle_backoff(backoff, shutdown_rx).await;
            }
        }
    }
}

/// Sleep out the idle backoff, waking early if shutdown is signalled.
async fn idle_backoff(backoff: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    // backoff は「待つ」ので select で shutdown と競合させる
    tokio::select! {
        _ = shutdown_rx.changed() => {}
        _ = tokio::time::sleep(backoff) => {}
    }
}
