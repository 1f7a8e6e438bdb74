//! Reservation data model (§3, §4.F).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationToken {
    pub id: String,
    pub party_id: String,
    pub member_id: String,
    pub username: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSnapshot {
    pub reservation_id: String,
    pub party_id: String,
    pub family_id: String,
    pub variant_id: String,
    pub target_server_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub tokens: std::collections::BTreeMap<String, ReservationToken>,
}

/// One party member as the reservation service needs to see them — decoupled
/// from the party crate's own `PartyMember` so this crate never depends on
/// the full party coordinator (just the narrow [`crate::sink::PartyReservationSink`]).
#[derive(Debug, Clone)]
pub struct ReservationParticipant {
    pub player_id: String,
    pub username: String,
    pub online: bool,
}
