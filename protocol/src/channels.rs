//! Pub/sub channel names. These MUST match byte-exactly across every process
//! that talks to the bus (§6, external interfaces).

/// Directed registration requests from an agent to the registry.
pub const REGISTRY_REGISTRATION_REQUEST: &str = "registry:registration:request";
/// Broadcast registration responses (agents filter by their own temp id).
pub const SERVER_REGISTRATION_RESPONSE: &str = "server:registration:response";
/// Heartbeats from every server.
pub const SERVER_HEARTBEAT: &str = "server:heartbeat";
/// Peer/proxy discovery announcements.
pub const SERVER_ANNOUNCEMENT: &str = "server:announcement";
/// Sent when a server is removed (shutdown or crash reclaim).
pub const SERVER_REMOVED: &str = "server:removed";
/// Evacuation request directed at a specific server.
pub const SERVER_EVACUATION_REQUEST: &str = "server:evacuation:request";
/// Evacuation response from the evacuated server.
pub const SERVER_EVACUATION_RESPONSE: &str = "server:evacuation:response";
/// Proxy capacity/identity announcements.
pub const PROXY_ANNOUNCEMENT: &str = "proxy:announcement";
/// Broadcast by the registry on restart, asking every agent to re-register.
pub const PROXY_REQUEST_REGISTRATIONS: &str = "proxy:request-registrations";
/// Party state changes, fanned out to every interested proxy/server.
pub const PARTY_UPDATE: &str = "party:update";
/// A reservation was created for a party.
pub const PARTY_RESERVATION_CREATED: &str = "party:reservation:created";

/// A response channel scoped to one registration attempt, keyed by temp id.
pub fn server_registration_response_for(temp_id: &str) -> String {
    format!("server:registration:response:{temp_id}")
}

/// The channel a single server listens on for directed messages.
pub fn server_channel(server_id: &str) -> String {
    format!("server:{server_id}")
}

/// The channel the registry uses to ask one specific server to re-register.
pub fn server_reregister_channel(server_id: &str) -> String {
    format!("server:{server_id}:reregister")
}

/// The generic response channel used for request/reply correlation.
pub fn response_channel(id: &str) -> String {
    format!("response:{id}")
}

/// Provisioning channel for a slot on a given server.
pub fn slot_provision_channel(server_id: &str) -> String {
    format!("slot:provision:{server_id}")
}

/// External transport channel used to route a player onto a server.
pub fn player_route_channel(server_id: &str) -> String {
    format!("server:{server_id}:player-route")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templated_channels_match_byte_exact_layout() {
        assert_eq!(server_channel("game-3"), "server:game-3");
        assert_eq!(
            server_reregister_channel("game-3"),
            "server:game-3:reregister"
        );
        assert_eq!(response_channel("game-3"), "response:game-3");
        assert_eq!(
            server_registration_response_for("temp-abcd1234"),
            "server:registration:response:temp-abcd1234"
        );
        assert_eq!(
            slot_provision_channel("game-3"),
            "slot:provision:game-3"
        );
        assert_eq!(
            player_route_channel("game-3"),
            "server:game-3:player-route"
        );
    }
}
