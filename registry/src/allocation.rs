//! Server-id allocation (§4.D): smallest non-negative `N` such that the
//! candidate id is free, using `fulcrum-proxy-<N>` for proxies and
//! `<family>-<N>` for game servers.

use std::collections::HashMap;

use crate::record::ServerRecord;

pub const PROXY_PREFIX: &str = "fulcrum-proxy";

pub fn is_temp_id(server_id: &str) -> bool {
    server_id.starts_with("temp-")
}

pub fn is_proxy_registrant(family: &str, role: &str) -> bool {
    family.eq_ignore_ascii_case("proxy") || role.eq_ignore_ascii_case("proxy")
}

/// Finds the smallest non-negative `N` with `<prefix>-<N>` absent from
/// `records`.
pub fn smallest_free_id(records: &HashMap<String, ServerRecord>, prefix: &str) -> String {
    let mut n = 0u64;
    loop {
        let candidate = format!("{prefix}-{n}");
        if !records.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::ServerType;
    use uuid::Uuid;

    fn record(id: &str) -> ServerRecord {
        ServerRecord {
            server_id: id.to_string(),
            instance_uuid: Uuid::new_v4(),
            server_type: ServerType::Mini,
            family: "lobby".to_string(),
            address: "127.0.0.1".to_string(),
            port: 25565,
            max_capacity: 15,
            status: crate::record::ServerStatus::Ready,
            last_heartbeat_at: 0,
        }
    }

    #[test]
    fn picks_smallest_free_slot() {
        let mut records = HashMap::new();
        records.insert("lobby-0".to_string(), record("lobby-0"));
        records.insert("lobby-1".to_string(), record("lobby-1"));
        assert_eq!(smallest_free_id(&records, "lobby"), "lobby-2".to_string());
    }

    #[test]
    fn fills_gaps_before_extending() {
        let mut records = HashMap::new();
        records.insert("lobby-0".to_string(), record("lobby-0"));
        records.insert("lobby-2".to_string(), record("lobby-2"));
        assert_eq!(smallest_free_id(&records, "lobby"), "lobby-1".to_string());
    }

    #[test]
    fn proxy_registrant_detected_from_family_or_role() {
        assert!(is_proxy_registrant("proxy", "whatever"));
        assert!(is_proxy_registrant("whatever", "PROXY"));
        assert!(!is_proxy_registrant("lobby", "lobby"));
    }
}
