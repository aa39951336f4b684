//! Domain model: task identity and the envelope that travels through queues.

mod task;

pub use task::{TaskId, TaskItem};
