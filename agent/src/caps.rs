//! Server sizing (§3): the serverType is derived once at boot from the
//! process's max-heap size, and caps follow from the type.

use protocol::messages::ServerType;

/// 8 GiB, the MINI/MEGA boundary. `== 8 GiB` is still MINI.
pub const MINI_MAX_HEAP_BYTES: u64 = 8 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub soft_cap: u32,
    pub hard_cap: u32,
}

pub fn detect_server_type(max_heap_bytes: u64) -> ServerType {
    if max_heap_bytes <= MINI_MAX_HEAP_BYTES {
        ServerType::Mini
    } else {
        ServerType::Mega
    }
}

pub fn caps_for(server_type: ServerType) -> Caps {
    match server_type {
        ServerType::Mini => Caps {
            soft_cap: 10,
            hard_cap: 15,
        },
        ServerType::Mega => Caps {
            soft_cap: 60,
            hard_cap: 70,
        },
    }
}
