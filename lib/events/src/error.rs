//! Error type for event bus publication.

use std::fmt;

/// Failure modes for publishing to the event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Could not connect to the broker.
    ConnectionFailed { message: String },
    /// Publish failed.
    PublishFailed { message: String },
}

impl fmt::Display for EventBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => write!(f, "event bus connection failed: {message}"),
            Self::PublishFailed { message } => write!(f, "event bus publish failed: {message}"),
        }
    }
}

impl std::error::Error for EventBusError {}

impl From<EventBusError> for meridian_execution::ports::StoreError {
    fn from(err: EventBusError) -> Self {
        meridian_execution::ports::StoreError(err.to_string())
    }
}
