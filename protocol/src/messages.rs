//! Payload structs carried inside an [`crate::Envelope`] (§6).

use serde::{Deserialize, Serialize};

/// `MINI` servers cap at 8 GiB max heap; anything larger is `MEGA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerType {
    Mini,
    Mega,
}

/// Sent by an agent to `registry:registration:request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRegistrationRequest {
    pub server_id: String,
    pub server_type: ServerType,
    pub role: String,
    pub address: String,
    pub port: u16,
    pub max_capacity: u32,
    pub family: Option<String>,
}

/// Reply to a [`ServerRegistrationRequest`], broadcast on
/// `server:registration:response` and also directed at
/// `server:registration:response:<tempId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRegistrationResponse {
    pub temp_id: String,
    pub success: bool,
    pub assigned_server_id: Option<String>,
    pub proxy_id: Option<String>,
    pub message: String,
}

/// Published every heartbeat interval on `server:heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHeartbeatMessage {
    pub server_id: String,
    pub server_type: ServerType,
    /// Clamped to <= 20.
    pub tps: f32,
    pub player_count: u32,
    pub max_capacity: u32,
    pub uptime_ms: u64,
    pub role: String,
    pub available_pools: Vec<String>,
    /// Present only on the terminal heartbeat sent during shutdown.
    pub status: Option<String>,
}

/// Broadcast on `server:announcement` for peer/proxy discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAnnouncementMessage {
    pub server_id: String,
    pub server_type: ServerType,
    pub environment: String,
    pub role: String,
    pub max_capacity: u32,
    pub address: String,
    pub port: u16,
}

/// Broadcast on `proxy:announcement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyAnnouncementMessage {
    pub proxy_id: String,
    pub address: String,
    pub capacity: u32,
    pub current_player_count: u32,
    pub hard_cap: u32,
}

/// Sent on `server:removed` when a server shuts down or is crash-reclaimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRemovalNotification {
    pub server_id: String,
    pub server_type: ServerType,
    pub reason: RemovalReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    Shutdown,
    Crashed,
}

/// Directed at `server:<id>:evacuation:request`... actually published on
/// `server:evacuation:request` and filtered by `server_id` by the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvacuationRequest {
    pub server_id: String,
    pub reason: String,
}

/// Published on `server:evacuation:response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEvacuationResponse {
    pub server_id: String,
    pub ok: bool,
    pub evacuated: u32,
    pub failed: u32,
    pub message: String,
}

/// Broadcast by the registry on restart, on `proxy:request-registrations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryReregistrationRequest {
    pub requested_at: i64,
}

/// The action a [`PartyUpdateMessage`] is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyAction {
    Created,
    InviteSent,
    InviteAccepted,
    InviteRevoked,
    InviteExpired,
    MemberLeft,
    MemberKicked,
    RoleChanged,
    Transferred,
    SettingsUpdated,
    Disbanded,
    ReservationCreated,
    ReservationClaimed,
}

/// Published on `party:update` after every mutation. `snapshot` is the
/// serialized `PartySnapshot` from the `party` crate; kept generic here so
/// this leaf crate has no dependency on the party coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyUpdateMessage {
    pub party_id: String,
    pub snapshot: Option<serde_json::Value>,
    pub action: PartyAction,
    pub actor_id: String,
    pub target_id: Option<String>,
    pub reason: Option<String>,
    pub timestamp: i64,
}

/// Published on a server's `server:<id>:player-route` channel during
/// evacuation. The actual transport handoff is the external TCP
/// player-transport cookie (out of scope); this is just the thin envelope
/// payload that tells the target server a player is inbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRouteRequest {
    pub player_id: String,
    pub from_server_id: String,
    pub reason: String,
}

/// Published on `party:reservation:created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyReservationCreatedMessage {
    pub reservation_id: String,
    pub party_id: String,
    pub family_id: String,
    pub variant_id: String,
    pub target_server_id: String,
    pub reservation: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_type_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ServerType::Mini).unwrap();
        assert_eq!(json, "\"MINI\"");
        let json = serde_json::to_string(&ServerType::Mega).unwrap();
        assert_eq!(json, "\"MEGA\"");
    }

    #[test]
    fn party_action_round_trips() {
        for action in [
            PartyAction::Created,
            PartyAction::InviteSent,
            PartyAction::Disbanded,
            PartyAction::ReservationClaimed,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            let back: PartyAction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, action);
        }
    }
}
