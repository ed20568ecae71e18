//! The work queue: FIFO, per-tenant-ordered, at-least-once delivery of
//! execution requests between the Submission API and the Execution Engine.

pub mod error;
pub mod item;
pub mod nats;
pub mod queue;

pub use error::QueueError;
pub use item::WorkItem;
pub use nats::{NatsQueueConfig, NatsWorkQueue};
pub use queue::{AckHandle, Delivery, WorkQueue, MAX_DELAY};
