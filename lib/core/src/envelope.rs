//! Versioned envelope for data crossing a process boundary.
//!
//! Queue messages and event-bus payloads are wrapped in this envelope so
//! the wire format can evolve without breaking readers of an older
//! version in flight during a rolling deploy.

use serde::{Deserialize, Serialize};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned envelope wrapping serialized data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self { version: CURRENT_VERSION, payload }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns a reference to the payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Returns true if this envelope uses the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Deserializes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A versioned envelope that defers payload deserialization.
///
/// Useful to inspect `version` before committing to a payload type, e.g.
/// when a consumer needs to branch on envelope version during a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// The version of the envelope format.
    pub version: u32,
    /// The raw payload, not yet deserialized.
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    /// Attempts to deserialize the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be deserialized into `T`.
    pub fn deserialize_payload<T: for<'de> Deserialize<'de>>(self) -> Result<Envelope<T>, serde_json::Error> {
        let payload: T = serde_json::from_value(self.payload)?;
        Ok(Envelope { version: self.version, payload })
    }

    /// Deserializes a raw envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct TestPayload {
        message: String,
        count: u32,
    }

    #[test]
    fn envelope_creation() {
        let payload = TestPayload { message: "hello".to_string(), count: 42 };
        let envelope = Envelope::new(payload.clone());
        assert_eq!(envelope.version, CURRENT_VERSION);
        assert_eq!(envelope.payload(), &payload);
        assert!(envelope.is_current_version());
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let envelope = Envelope::new(TestPayload { message: "test".to_string(), count: 100 });
        let bytes = envelope.to_json_bytes().expect("serialize");
        let parsed: Envelope<TestPayload> = Envelope::from_json_bytes(&bytes).expect("deserialize");
        assert_eq!(envelope, parsed);
    }

    #[test]
    fn raw_envelope_lazy_deserialization() {
        let payload = TestPayload { message: "lazy".to_string(), count: 7 };
        let bytes = Envelope::new(payload.clone()).to_json_bytes().expect("serialize");
        let raw = RawEnvelope::from_json_bytes(&bytes).expect("deserialize raw");
        assert_eq!(raw.version, CURRENT_VERSION);
        let typed: Envelope<TestPayload> = raw.deserialize_payload().expect("deserialize payload");
        assert_eq!(typed.payload, payload);
    }
}
