//! The registry service (§4.D): the authoritative `serverId -> metadata`
//! map, id allocation, liveness/crash detection, and re-registration
//! broadcasts.
//!
//! A single shared, lock-guarded map that every caller reads and mutates,
//! the same shape as any other connection-table registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use protocol::messages::{
    RegistryReregistrationRequest, ServerHeartbeatMessage, ServerRegistrationRequest,
    ServerRegistrationResponse, ServerRemovalNotification,
};
use protocol::{channels, Clock, Envelope};
use tokio::sync::Mutex;
use uuid::Uuid;

use bus::Bus;

use crate::allocation::{is_proxy_registrant, is_temp_id, smallest_free_id, PROXY_PREFIX};
use crate::record::{ServerRecord, ServerStatus};

/// Default crash window from the quantified invariant in §8: a server with
/// no heartbeat for more than this is considered crashed.
pub const CRASH_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Assigned(String),
    Reclaimed(String),
    Failure(String),
}

pub struct RegistryService {
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, ServerRecord>>,
}

impl RegistryService {
    pub fn new(bus: Arc<dyn Bus>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(RegistryService {
            bus,
            clock,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Runs the registry's request handling for the lifetime of the
    /// process: registration requests, heartbeats, and removal
    /// notifications. Broadcasts a `RegistryReregistrationRequest` once up
    /// front so agents that were already running re-announce themselves.
    pub async fn run(self: &Arc<Self>) {
        let mut registrations = self.bus.subscribe(channels::REGISTRY_REGISTRATION_REQUEST);
        let mut heartbeats = self.bus.subscribe(channels::SERVER_HEARTBEAT);
        let mut removals = self.bus.subscribe(channels::SERVER_REMOVED);

        self.broadcast_reregistration_request().await;

        loop {
            tokio::select! {
                Some(envelope) = registrations.recv() => {
                    self.handle_registration_envelope(envelope).await;
                }
                Some(envelope) = heartbeats.recv() => {
                    self.handle_heartbeat_envelope(envelope).await;
                }
                Some(envelope) = removals.recv() => {
                    self.handle_removal_envelope(envelope).await;
                }
                else => return,
            }
        }
    }

    async fn broadcast_reregistration_request(&self) {
        let request = RegistryReregistrationRequest {
            requested_at: self.clock.now_millis(),
        };
        let envelope = self.envelope("RegistryReregistrationRequest", "registry", &request);
        if let Err(error) = self
            .bus
            .broadcast(channels::PROXY_REQUEST_REGISTRATIONS, envelope)
            .await
        {
            tracing::warn!(error = %error, "re-registration broadcast failed");
        }
    }

    fn envelope<T: serde::Serialize>(
        &self,
        message_type: &str,
        sender_id: &str,
        payload: &T,
    ) -> Envelope {
        Envelope::new(message_type, sender_id, self.clock.now_millis(), payload)
            .expect("message payloads are plain structs and always serialize")
    }

    async fn handle_registration_envelope(self: &Arc<Self>, envelope: Envelope) {
        let request = match envelope.decode::<ServerRegistrationRequest>() {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(error = %error, "malformed registration request");
                return;
            }
        };
        let instance_uuid = match envelope.sender_id.parse::<Uuid>() {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!(error = %error, sender_id = %envelope.sender_id, "registration request with non-UUID sender id");
                return;
            }
        };
        let temp_id = request.server_id.clone();
        let outcome = self.register(&request, instance_uuid).await;

        let response = match &outcome {
            RegistrationOutcome::Assigned(id) | RegistrationOutcome::Reclaimed(id) => {
                ServerRegistrationResponse {
                    temp_id: temp_id.clone(),
                    success: true,
                    assigned_server_id: Some(id.clone()),
                    proxy_id: None,
                    message: "ok".to_string(),
                }
            }
            RegistrationOutcome::Failure(message) => ServerRegistrationResponse {
                temp_id: temp_id.clone(),
                success: false,
                assigned_server_id: None,
                proxy_id: None,
                message: message.clone(),
            },
        };
        tracing::info!(temp_id = %temp_id, outcome = ?outcome, "processed registration request");

        let direct = self.envelope("ServerRegistrationResponse", "registry", &response);
        let broadcast = self.envelope("ServerRegistrationResponse", "registry", &response);
        let direct_channel = channels::server_registration_response_for(&temp_id);
        if let Err(error) = self.bus.broadcast(&direct_channel, direct).await {
            tracing::warn!(error = %error, "registration response publish failed");
        }
        if let Err(error) = self
            .bus
            .broadcast(channels::SERVER_REGISTRATION_RESPONSE, broadcast)
            .await
        {
            tracing::warn!(error = %error, "registration response broadcast failed");
        }
    }

    /// Implements §4.D's registration algorithm. If `request.server_id` is
    /// still a temporary id, a fresh id is allocated with the
    /// smallest-free-`N` scheme; otherwise the requested id itself is
    /// treated as "the chosen id" and run through the collision check
    /// directly — this is how a process that retained its permanent id
    /// across a restart gets reclaimed rather than rejected (§8 scenario
    /// 2).
    pub async fn register(
        &self,
        request: &ServerRegistrationRequest,
        instance_uuid: Uuid,
    ) -> RegistrationOutcome {
        let mut records = self.records.lock().await;
        let is_proxy = is_proxy_registrant(
            request.family.as_deref().unwrap_or(""),
            &request.role,
        );
        let chosen_id = if is_temp_id(&request.server_id) {
            let prefix: String = if is_proxy {
                PROXY_PREFIX.to_string()
            } else {
                request.family.clone().unwrap_or_else(|| request.role.clone())
            };
            smallest_free_id(&records, &prefix)
        } else {
            request.server_id.clone()
        };

        let now = self.clock.now_millis();
        let outcome = match records.get(&chosen_id) {
            None => RegistrationOutcome::Assigned(chosen_id.clone()),
            Some(existing) if existing.instance_uuid == instance_uuid => {
                RegistrationOutcome::Reclaimed(chosen_id.clone())
            }
            Some(existing)
                if existing.status == ServerStatus::Offline
                    || now - existing.last_heartbeat_at > CRASH_WINDOW.as_millis() as i64 =>
            {
                RegistrationOutcome::Reclaimed(chosen_id.clone())
            }
            Some(_) => RegistrationOutcome::Failure("ID in use".to_string()),
        };

        if !matches!(outcome, RegistrationOutcome::Failure(_)) {
            records.insert(
                chosen_id.clone(),
                ServerRecord {
                    server_id: chosen_id,
                    instance_uuid,
                    server_type: request.server_type,
                    family: request.family.clone().unwrap_or_else(|| request.role.clone()),
                    address: request.address.clone(),
                    port: request.port,
                    max_capacity: request.max_capacity,
                    status: ServerStatus::Ready,
                    last_heartbeat_at: now,
                },
            );
        }
        outcome
    }

    async fn handle_heartbeat_envelope(&self, envelope: Envelope) {
        if let Ok(heartbeat) = envelope.decode::<ServerHeartbeatMessage>() {
            self.record_heartbeat(&heartbeat).await;
        }
    }

    async fn record_heartbeat(&self, heartbeat: &ServerHeartbeatMessage) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&heartbeat.server_id) {
            record.last_heartbeat_at = self.clock.now_millis();
            record.max_capacity = heartbeat.max_capacity;
            if heartbeat.status.as_deref() == Some("SHUTDOWN") {
                record.status = ServerStatus::Offline;
            } else if record.status == ServerStatus::Offline {
                record.status = ServerStatus::Ready;
            }
        }
    }

    async fn handle_removal_envelope(&self, envelope: Envelope) {
        if let Ok(removal) = envelope.decode::<ServerRemovalNotification>() {
            let mut records = self.records.lock().await;
            if let Some(record) = records.get_mut(&removal.server_id) {
                record.status = ServerStatus::Offline;
            }
        }
    }

    /// Marks every server whose last heartbeat is older than `timeout` as
    /// OFFLINE, returning the ids newly marked.
    pub async fn check_crashed(&self, timeout: Duration) -> Vec<String> {
        let now = self.clock.now_millis();
        let mut records = self.records.lock().await;
        let mut crashed = Vec::new();
        for record in records.values_mut() {
            if record.status != ServerStatus::Offline
                && now - record.last_heartbeat_at > timeout.as_millis() as i64
            {
                record.status = ServerStatus::Offline;
                crashed.push(record.server_id.clone());
            }
        }
        crashed
    }

    /// The first READY, non-crashed server of `family`.
    pub async fn get_best_server(&self, family: &str) -> Option<ServerRecord> {
        let records = self.records.lock().await;
        records
            .values()
            .find(|record| record.family == family && record.status == ServerStatus::Ready)
            .cloned()
    }

    pub async fn get(&self, server_id: &str) -> Option<ServerRecord> {
        self.records.lock().await.get(server_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::ServerType;

    fn request(server_id: &str, family: &str) -> ServerRegistrationRequest {
        ServerRegistrationRequest {
            server_id: server_id.to_string(),
            server_type: ServerType::Mini,
            role: family.to_string(),
            address: "127.0.0.1".to_string(),
            port: 25565,
            max_capacity: 15,
            family: Some(family.to_string()),
        }
    }

    #[tokio::test]
    async fn first_registration_is_assigned_smallest_free_id() {
        let registry = RegistryService::new(
            Arc::new(bus::LocalBus::default()),
            Arc::new(protocol::FixedClock::new(0)),
        );
        let outcome = registry
            .register(&request("temp-aaaaaaaa", "lobby"), Uuid::new_v4())
            .await;
        assert_eq!(outcome, RegistrationOutcome::Assigned("lobby-0".to_string()));
    }

    #[tokio::test]
    async fn same_instance_reregistering_with_permanent_id_is_reclaimed() {
        let clock = protocol::FixedClock::new(0);
        let registry = RegistryService::new(Arc::new(bus::LocalBus::default()), Arc::new(clock.clone()));
        let instance = Uuid::new_v4();
        registry
            .register(&request("temp-aaaaaaaa", "game"), instance)
            .await;

        clock.advance(61_000);
        let outcome = registry.register(&request("game-0", "game"), instance).await;
        assert_eq!(outcome, RegistrationOutcome::Reclaimed("game-0".to_string()));
    }

    #[tokio::test]
    async fn crashed_server_id_can_be_reclaimed_by_a_new_instance() {
        let clock = protocol::FixedClock::new(0);
        let registry = RegistryService::new(Arc::new(bus::LocalBus::default()), Arc::new(clock.clone()));
        let original = Uuid::new_v4();
        registry
            .register(&request("temp-aaaaaaaa", "game"), original)
            .await;

        clock.advance(61_000);
        let newcomer = Uuid::new_v4();
        let outcome = registry.register(&request("game-0", "game"), newcomer).await;
        assert_eq!(outcome, RegistrationOutcome::Reclaimed("game-0".to_string()));
    }

    #[tokio::test]
    async fn live_id_in_use_by_a_different_instance_fails() {
        let clock = protocol::FixedClock::new(0);
        let registry = RegistryService::new(Arc::new(bus::LocalBus::default()), Arc::new(clock));
        registry
            .register(&request("temp-aaaaaaaa", "game"), Uuid::new_v4())
            .await;
        let outcome = registry
            .register(&request("game-0", "game"), Uuid::new_v4())
            .await;
        assert_eq!(outcome, RegistrationOutcome::Failure("ID in use".to_string()));
    }

    #[tokio::test]
    async fn check_crashed_marks_stale_servers_offline() {
        let clock = protocol::FixedClock::new(0);
        let registry = RegistryService::new(Arc::new(bus::LocalBus::default()), Arc::new(clock.clone()));
        registry
            .register(&request("temp-aaaaaaaa", "game"), Uuid::new_v4())
            .await;
        clock.advance(61_000);
        let crashed = registry.check_crashed(Duration::from_secs(60)).await;
        assert_eq!(crashed, vec!["game-0".to_string()]);
    }

    #[tokio::test]
    async fn get_best_server_returns_first_ready_of_family() {
        let registry = RegistryService::new(
            Arc::new(bus::LocalBus::default()),
            Arc::new(protocol::FixedClock::new(0)),
        );
        registry
            .register(&request("temp-aaaaaaaa", "lobby"), Uuid::new_v4())
            .await;
        let best = registry.get_best_server("lobby").await.unwrap();
        assert_eq!(best.server_id, "lobby-0");
        assert!(registry.get_best_server("duels").await.is_none());
    }
}
