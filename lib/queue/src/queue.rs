//! The [`WorkQueue`] port: FIFO, per-tenant-ordered, at-least-once delivery
//! of [`WorkItem`]s with deduplication by run id.

use crate::error::QueueError;
use crate::item::WorkItem;
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound on delayed delivery, per the submission contract.
pub const MAX_DELAY: Duration = Duration::from_secs(15 * 60);

/// Acknowledges or rejects one delivered [`WorkItem`].
///
/// Implementations are the thing that actually talks to the broker; a
/// [`Delivery`] is a thin, queue-agnostic wrapper around one.
#[async_trait]
pub trait AckHandle: Send + Sync {
    /// Confirms processing completed; the item will not be redelivered.
    async fn ack(&self) -> Result<(), QueueError>;
    /// Signals processing failed; the item becomes eligible for redelivery,
    /// subject to the queue's poison threshold.
    async fn nack(&self) -> Result<(), QueueError>;
}

/// One item pulled off the queue, together with its delivery count and
/// acknowledgement handle.
pub struct Delivery {
    /// The delivered item.
    pub item: WorkItem,
    /// How many times this item has been delivered, including this one.
    /// `1` on first delivery.
    pub delivery_count: u64,
    handle: Box<dyn AckHandle>,
}

impl Delivery {
    /// Wraps an item with its delivery count and ack handle.
    pub fn new(item: WorkItem, delivery_count: u64, handle: Box<dyn AckHandle>) -> Self {
        Self { item, delivery_count, handle }
    }

    /// Confirms processing completed.
    pub async fn ack(&self) -> Result<(), QueueError> {
        self.handle.ack().await
    }

    /// Signals processing failed; the queue will redeliver.
    pub async fn nack(&self) -> Result<(), QueueError> {
        self.handle.nack().await
    }
}

/// FIFO, per-tenant-ordered, at-least-once queue of execution requests.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues `item`, deduplicated by `item.dedup_id(retry_sequence)`.
    /// `delay` defers visibility by up to [`MAX_DELAY`].
    async fn enqueue(&self, item: WorkItem, retry_sequence: Option<u64>, delay: Option<Duration>) -> Result<(), QueueError>;

    /// Pulls the next available item, or `None` if none is currently
    /// available within the implementation's poll window.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;
}
