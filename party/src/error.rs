//! The party coordinator's error taxonomy (§7): user-facing classes, not
//! exception types — callers render these, they don't catch and discard.

use thiserror::Error;

pub type PartyResult<T> = Result<T, PartyError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartyError {
    #[error("you are already in a party")]
    AlreadyInParty,
    #[error("you are not in a party")]
    NotInParty,
    #[error("only the party leader can do that")]
    NotLeader,
    #[error("only a party moderator or the leader can do that")]
    NotModerator,
    #[error("that player is already in a party")]
    TargetAlreadyInParty,
    #[error("that player is not in this party")]
    TargetNotInParty,
    #[error("there is already a pending invite for that player")]
    InviteAlreadyPending,
    #[error("no invite was found")]
    InviteNotFound,
    #[error("that invite has expired")]
    InviteExpired,
    #[error("the party is full")]
    PartyFull,
    #[error("only the party leader can do that")]
    LeaderOnlyAction,
    #[error("you cannot target yourself")]
    CannotTargetSelf,
    #[error("the shared store is unavailable")]
    RedisUnavailable,
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<kv::KvError> for PartyError {
    fn from(_: kv::KvError) -> Self {
        PartyError::RedisUnavailable
    }
}
