//! Best-effort publisher of metering and progress events (C5) over NATS
//! core publish/subscribe.

pub mod envelope;
pub mod error;
pub mod nats;

pub use envelope::EventEnvelope;
pub use error::EventBusError;
pub use nats::NatsEventBus;
