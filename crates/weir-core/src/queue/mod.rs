//! Delaying task queue over a CoordinationStore.
//!
//! Producers serialize tasks into a store-resident scored set where the
//! score is the absolute time the task becomes visible. Consumers poll the
//! visible range and claim by atomic removal, so a task enqueued once is
//! handled at most once no matter how many consumers race for it.

mod consumer;
mod delay_queue;

pub use consumer::ConsumerGroup;
pub use delay_queue::{DelayQueue, QueueConfig};

use async_trait::async_trait;

use crate::domain::TaskItem;
use crate::error::WeirError;

/// Downstream processor for claimed tasks.
///
/// Design intent:
/// - The queue hands over an owned payload; by the time the handler runs,
///   the entry is already gone from the store.
/// - A handler error is reported, not retried. Re-enqueueing after a
///   failure is the caller's policy decision.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync {
    async fn handle(&self, payload: T) -> Result<(), WeirError>;
}

/// Result of one poll-and-claim round.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// Nothing visible yet.
    Empty,

    /// A visible task existed but another consumer claimed it first.
    /// Ordinary contention, not an error.
    Lost,

    /// This consumer won the claim and now owns the task.
    Claimed(TaskItem<T>),
}
