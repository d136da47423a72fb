//! Task queue with delayed redelivery and a dead-letter queue.
//!
//! Delivery is at-least-once: a task that is claimed but never acknowledged
//! is redelivered, so every handler must be idempotent.

pub mod store;
pub mod types;

pub use store::{InMemoryTaskQueue, QueueError, TaskQueue};
pub use types::{DeadLetterEntry, QueueStats, Task, TaskPayload};
