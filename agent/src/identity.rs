//! The identity record an agent owns for its own process (§3). The registry
//! keeps the authoritative copy of the same shape across every server it
//! tracks; this one is local and self-describing.

use protocol::messages::ServerType;
use uuid::Uuid;

use crate::caps::Caps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Starting,
    Ready,
    Stopping,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub server_id: String,
    pub instance_uuid: Uuid,
    pub family: String,
    pub server_type: ServerType,
    pub address: String,
    pub port: u16,
    pub caps: Caps,
    pub status: ServerStatus,
    pub last_heartbeat_at: i64,
}

impl ServerIdentity {
    pub fn boot(
        family: String,
        server_type: ServerType,
        address: String,
        port: u16,
        caps: Caps,
        now_millis: i64,
    ) -> Self {
        ServerIdentity {
            server_id: format!("temp-{}", &Uuid::new_v4().simple().to_string()[..8]),
            instance_uuid: Uuid::new_v4(),
            family,
            server_type,
            address,
            port,
            caps,
            status: ServerStatus::Starting,
            last_heartbeat_at: now_millis,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.server_id.starts_with("temp-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_assigns_a_temp_id_shaped_server_id() {
        let identity = ServerIdentity::boot(
            "lobby".to_string(),
            ServerType::Mini,
            "127.0.0.1".to_string(),
            25566,
            Caps {
                soft_cap: 10,
                hard_cap: 15,
            },
            0,
        );
        assert!(identity.is_temporary());
        assert_eq!(identity.server_id.len(), "temp-".len() + 8);
        assert_eq!(identity.status, ServerStatus::Starting);
    }
}
