use thiserror::Error;

/// Failures from a [`crate::SharedKv`] backend. Every party-coordinator
/// operation maps this straight to `REDIS_UNAVAILABLE` (§4.E, §7) when a
/// lock can't be acquired because the store itself is unreachable.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv backend unavailable: {0}")]
    Unavailable(String),

    #[error("value at {key} was not valid utf-8")]
    InvalidEncoding { key: String },
}
