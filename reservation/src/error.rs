//! Reservation Service error taxonomy (§4.F).

use thiserror::Error;

pub type ReservationResult<T> = Result<T, ReservationError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("no online members to reserve for")]
    NoOnlineMembers,
    #[error("party of {party_size} exceeds {label} max team size of {max_team_size}")]
    TeamSizeExceeded {
        label: String,
        party_size: usize,
        max_team_size: u32,
    },
    #[error("the shared store is unavailable")]
    RedisUnavailable,
    #[error("party coordinator rejected the reservation binding: {0}")]
    PartyBindingFailed(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<kv::KvError> for ReservationError {
    fn from(_: kv::KvError) -> Self {
        ReservationError::RedisUnavailable
    }
}
