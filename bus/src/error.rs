use thiserror::Error;

/// Failures surfaced by a [`crate::Bus`] implementation. §7: nothing in the
/// core catches and discards, so every bus failure is either retried by the
/// caller or returned here with enough context to log.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus backend unavailable: {0}")]
    Unavailable(String),

    #[error("request to {channel} timed out")]
    Timeout { channel: String },

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}
