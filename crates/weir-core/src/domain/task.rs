use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique task identifier.
///
/// A ULID minted from the store clock plus random entropy: 128-bit,
/// generated without coordination, never reused. Serializes as the plain
/// 26-character string so it stays readable inside queue members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Mint a fresh id stamped with `now_ms` (epoch milliseconds, normally
    /// read from the store clock).
    pub fn generate_at(now_ms: u64) -> Self {
        Self(Ulid::from_parts(now_ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What actually sits in a queue: identity plus the caller's payload.
///
/// Identity is `id` alone. Two items with equal payloads are distinct
/// tasks and are enqueued, claimed and handled independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem<T> {
    id: TaskId,
    payload: T,
}

impl<T> TaskItem<T> {
    pub fn new(id: TaskId, payload: T) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}
