//! Evacuation target selection and the peer-announcement cache it reads
//! from (§4.C). The cache is populated passively as `ServerAnnouncementMessage`s
//! arrive on `server:announcement`; it is a discovery hint, not a liveness
//! source — the registry remains authoritative for that.

use dashmap::DashMap;
use protocol::messages::ServerAnnouncementMessage;

#[derive(Debug, Default)]
pub struct AnnouncementCache {
    servers: DashMap<String, ServerAnnouncementMessage>,
}

impl AnnouncementCache {
    pub fn new() -> Self {
        AnnouncementCache::default()
    }

    pub fn record(&self, announcement: ServerAnnouncementMessage) {
        self.servers
            .insert(announcement.server_id.clone(), announcement);
    }

    pub fn remove(&self, server_id: &str) {
        self.servers.remove(server_id);
    }

    /// First a non-self server whose role contains "lobby", else any other
    /// non-self server in the cache.
    pub fn pick_evacuation_target(&self, self_id: &str) -> Option<String> {
        let lobby = self
            .servers
            .iter()
            .find(|entry| entry.key() != self_id && entry.value().role.contains("lobby"))
            .map(|entry| entry.key().clone());
        lobby.or_else(|| {
            self.servers
                .iter()
                .find(|entry| entry.key() != self_id)
                .map(|entry| entry.key().clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::ServerType;

    fn announce(id: &str, role: &str) -> ServerAnnouncementMessage {
        ServerAnnouncementMessage {
            server_id: id.to_string(),
            server_type: ServerType::Mini,
            environment: role.to_string(),
            role: role.to_string(),
            max_capacity: 15,
            address: "127.0.0.1".to_string(),
            port: 25566,
        }
    }

    #[test]
    fn prefers_a_lobby_role_server() {
        let cache = AnnouncementCache::new();
        cache.record(announce("duels-0", "duels"));
        cache.record(announce("lobby-0", "lobby"));
        assert_eq!(
            cache.pick_evacuation_target("duels-0"),
            Some("lobby-0".to_string())
        );
    }

    #[test]
    fn falls_back_to_any_non_self_server() {
        let cache = AnnouncementCache::new();
        cache.record(announce("duels-0", "duels"));
        cache.record(announce("duels-1", "duels"));
        assert_eq!(
            cache.pick_evacuation_target("duels-0"),
            Some("duels-1".to_string())
        );
    }

    #[test]
    fn returns_none_with_no_other_servers() {
        let cache = AnnouncementCache::new();
        cache.record(announce("duels-0", "duels"));
        assert_eq!(cache.pick_evacuation_target("duels-0"), None);
    }
}
