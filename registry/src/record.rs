//! The authoritative per-server record the registry keeps (§3, §4.D). The
//! registry owns this map; each agent only owns its own local copy.

use protocol::messages::ServerType;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Ready,
    Stopping,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub server_id: String,
    pub instance_uuid: Uuid,
    pub server_type: ServerType,
    pub family: String,
    pub address: String,
    pub port: u16,
    pub max_capacity: u32,
    pub status: ServerStatus,
    pub last_heartbeat_at: i64,
}
