//! The message envelope carried over the bus (§4.A). Delivery is
//! at-least-once, so every handler that consumes an [`Envelope`] must be
//! re-entrant and idempotent — the envelope itself carries no dedup key
//! beyond the payload's own identity fields.

use serde::{Deserialize, Serialize};

/// A typed, self-describing message traveling over a bus channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, e.g. `"ServerHeartbeatMessage"`.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The JSON-equivalent payload. Concrete payload structs live in
    /// [`crate::messages`]; callers serialize into and deserialize out of
    /// this field.
    pub payload: serde_json::Value,
    /// Opaque id of the process that sent this envelope.
    pub sender_id: String,
    /// Unix epoch millis at send time.
    pub timestamp: i64,
    /// Set by [`bus::Bus::request`]-style request/reply correlation; the
    /// channel the sender is waiting on for a reply. Plain broadcast/send
    /// traffic leaves this `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_channel: Option<String>,
}

impl Envelope {
    /// Builds an envelope around a typed payload.
    pub fn new(
        message_type: impl Into<String>,
        sender_id: impl Into<String>,
        timestamp: i64,
        payload: &impl Serialize,
    ) -> serde_json::Result<Self> {
        Ok(Envelope {
            message_type: message_type.into(),
            payload: serde_json::to_value(payload)?,
            sender_id: sender_id.into(),
            timestamp,
            reply_channel: None,
        })
    }

    /// Deserializes the payload into `T`, ignoring `message_type`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn round_trips_through_json_value() {
        let envelope = Envelope::new("Ping", "agent-1", 1000, &Ping { n: 7 }).unwrap();
        assert_eq!(envelope.message_type, "Ping");
        assert_eq!(envelope.sender_id, "agent-1");
        let decoded: Ping = envelope.decode().unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }
}
