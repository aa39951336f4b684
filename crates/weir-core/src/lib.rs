//! weir-core
//!
//! Coordination primitives over a shared atomic store: a delaying task
//! queue with exactly-once claim, and a reentrant distributed lock. The
//! store is abstracted behind a port, so the same primitives run against
//! Redis in production and an in-memory store in tests.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, TaskItem）
//! - **ports**: 抽象化レイヤー（CoordinationStore）
//! - **queue**: 遅延キュー（DelayQueue, ConsumerGroup, TaskHandler）
//! - **lock**: 再入可能な分散ロック（ReentrantLock, LockConfig）
//! - **impls**: 実装（InMemoryStore など開発用。本番用は weir-redis へ）
//!
//! # Example
//! ```ignore
//! let store = Arc::new(InMemoryStore::new());
//!
//! // producer side
//! let queue: Arc<DelayQueue<String, _>> =
//!     Arc::new(DelayQueue::new(Arc::clone(&store), "emails", QueueConfig::default()));
//! queue.enqueue("hello".to_string(), Duration::from_secs(5)).await?;
//!
//! // consumer side
//! let group = ConsumerGroup::spawn(3, queue, handler);
//! // ... later ...
//! group.shutdown_and_join().await;
//! ```

pub mod domain;
pub mod error;
pub mod impls;
pub mod lock;
pub mod ports;
pub mod queue;

pub use domain::{TaskId, TaskItem};
pub use error::{StoreError, WeirError};
pub use lock::{LockConfig, ReentrantLock};
pub use ports::CoordinationStore;
pub use queue::{ConsumerGroup, DelayQueue, PollOutcome, QueueConfig, TaskHandler};
