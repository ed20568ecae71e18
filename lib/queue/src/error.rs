//! Error type for [`crate::WorkQueue`] operations.

use std::fmt;

/// Failure modes for enqueue, dequeue, and acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Could not connect to or provision the backing stream.
    ConnectionFailed { message: String },
    /// Enqueue failed.
    PublishFailed { message: String },
    /// Dequeue/pull failed.
    ReceiveFailed { message: String },
    /// Acknowledging or rejecting a delivered item failed.
    AckFailed { message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => write!(f, "queue connection failed: {message}"),
            Self::PublishFailed { message } => write!(f, "queue publish failed: {message}"),
            Self::ReceiveFailed { message } => write!(f, "queue receive failed: {message}"),
            Self::AckFailed { message } => write!(f, "queue ack failed: {message}"),
        }
    }
}

impl std::error::Error for QueueError {}
