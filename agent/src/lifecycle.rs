//! The server lifecycle agent (§4.C): one per backend process, driving
//! `BOOT → AWAIT_REGISTRATION → REGISTERED(beating) → STOPPING → OFFLINE`.
//!
//! One long-lived task per concern (retry loop, heartbeat loop,
//! subscription fan-in), wired together with `tokio::select!` and
//! `tokio::sync::mpsc` rather than shared mutable state.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol::messages::{
    PlayerRouteRequest, ProxyAnnouncementMessage, RegistryReregistrationRequest, RemovalReason,
    ServerAnnouncementMessage, ServerEvacuationRequest, ServerEvacuationResponse,
    ServerHeartbeatMessage, ServerRegistrationRequest, ServerRegistrationResponse,
    ServerRemovalNotification,
};
use protocol::{channels, Clock, Envelope};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use bus::Bus;

use crate::backoff::{backoff_delay, REGISTRATION_TIMEOUT, TEMP_HEARTBEAT_THRESHOLD};
use crate::evacuation::AnnouncementCache;
use crate::identity::{ServerIdentity, ServerStatus};

/// The narrow capability an agent needs from the game-engine integration
/// (out of scope, §1): who is online and how to boot one off with a
/// reason. Kept tiny on purpose: cross-component hooks should be small
/// capability interfaces, not full services.
#[async_trait]
pub trait PlayerRoster: Send + Sync {
    async fn current_players(&self) -> Vec<String>;
    async fn disconnect(&self, player_id: &str, reason: &str);
}

/// A roster with no players; used by processes that don't host players
/// directly (proxies) or in tests.
#[derive(Debug, Default)]
pub struct EmptyRoster;

#[async_trait]
impl PlayerRoster for EmptyRoster {
    async fn current_players(&self) -> Vec<String> {
        Vec::new()
    }

    async fn disconnect(&self, _player_id: &str, _reason: &str) {}
}

pub struct AgentConfig {
    pub heartbeat_interval: Duration,
    pub max_heap_bytes: u64,
    pub address: String,
    pub port: u16,
    pub environment_path: std::path::PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            heartbeat_interval: Duration::from_secs(2),
            max_heap_bytes: 4 * 1024 * 1024 * 1024,
            address: "127.0.0.1".to_string(),
            port: 25565,
            environment_path: std::path::PathBuf::from("ENVIRONMENT"),
        }
    }
}

pub struct ServerLifecycleAgent {
    bus: Arc<dyn Bus>,
    clock: Arc<dyn Clock>,
    roster: Arc<dyn PlayerRoster>,
    identity: RwLock<ServerIdentity>,
    announcements: AnnouncementCache,
    proxy: RwLock<Option<ProxyAnnouncementMessage>>,
    bound_proxy_id: RwLock<Option<String>>,
    heartbeat_interval: Duration,
    started_at_millis: i64,
    tps: AtomicU32,
    player_count: AtomicU32,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ServerLifecycleAgent {
    pub fn boot(
        bus: Arc<dyn Bus>,
        clock: Arc<dyn Clock>,
        roster: Arc<dyn PlayerRoster>,
        config: AgentConfig,
    ) -> Arc<Self> {
        let server_type = crate::caps::detect_server_type(config.max_heap_bytes);
        let caps = crate::caps::caps_for(server_type);
        let family = crate::environment::read_role(&config.environment_path);
        let now = clock.now_millis();
        let identity =
            ServerIdentity::boot(family, server_type, config.address, config.port, caps, now);
        tracing::info!(
            server_id = %identity.server_id,
            server_type = ?identity.server_type,
            family = %identity.family,
            "agent booted"
        );
        Arc::new(ServerLifecycleAgent {
            bus,
            clock,
            roster,
            identity: RwLock::new(identity),
            announcements: AnnouncementCache::new(),
            proxy: RwLock::new(None),
            bound_proxy_id: RwLock::new(None),
            heartbeat_interval: config.heartbeat_interval,
            started_at_millis: now,
            tps: AtomicU32::new(2000),
            player_count: AtomicU32::new(0),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub async fn server_id(&self) -> String {
        self.identity.read().await.server_id.clone()
    }

    pub fn record_tps(&self, tps: f32) {
        let clamped = tps.clamp(0.0, 20.0);
        self.tps.store((clamped * 100.0) as u32, Ordering::Relaxed);
    }

    pub fn record_player_count(&self, count: u32) {
        self.player_count.store(count, Ordering::Relaxed);
    }

    fn envelope<T: serde::Serialize>(&self, message_type: &str, sender_id: &str, payload: &T) -> Envelope {
        Envelope::new(message_type, sender_id, self.clock.now_millis(), payload)
            .expect("message payloads are plain structs and always serialize")
    }

    /// Spawns background fan-in/heartbeat/registration tasks and drives
    /// registration to completion. Returns once registered; background
    /// tasks (heartbeat, evacuation handling, peer discovery) keep running
    /// until [`ServerLifecycleAgent::shutdown`].
    pub async fn run(self: &Arc<Self>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        self.spawn_fan_in(events_tx);
        self.register(events_rx).await;
    }

    fn spawn_fan_in(self: &Arc<Self>, events_tx: mpsc::Sender<Envelope>) {
        for channel in [
            channels::PROXY_ANNOUNCEMENT,
            channels::SERVER_ANNOUNCEMENT,
            channels::SERVER_EVACUATION_REQUEST,
            channels::PROXY_REQUEST_REGISTRATIONS,
        ] {
            let mut subscription = self.bus.subscribe(channel);
            let tx = events_tx.clone();
            let handle = tokio::spawn(async move {
                while let Some(envelope) = subscription.recv().await {
                    if tx.send(envelope).await.is_err() {
                        return;
                    }
                }
            });
            self.push_task(handle);
        }
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            tasks.push(handle);
        }
    }

    async fn register(self: &Arc<Self>, mut events_rx: mpsc::Receiver<Envelope>) {
        let mut attempt = 0u32;
        let mut temp_heartbeat_started = false;
        loop {
            attempt += 1;
            let (request, temp_id, instance_uuid) = {
                let identity = self.identity.read().await;
                (
                    ServerRegistrationRequest {
                        server_id: identity.server_id.clone(),
                        server_type: identity.server_type,
                        role: identity.family.clone(),
                        address: identity.address.clone(),
                        port: identity.port,
                        max_capacity: identity.caps.hard_cap,
                        family: Some(identity.family.clone()),
                    },
                    identity.server_id.clone(),
                    identity.instance_uuid.to_string(),
                )
            };
            tracing::info!(temp_id = %temp_id, attempt, "sending registration request");
            // `sender_id` carries the instance UUID, not the (mutable) server
            // id: the registry's crash-reclaim check needs a process
            // identity that survives a temp id being replaced by a
            // permanent one.
            let envelope = self.envelope("ServerRegistrationRequest", &instance_uuid, &request);
            let response_channel = channels::server_registration_response_for(&temp_id);
            let mut response_subscription = self.bus.subscribe(&response_channel);
            if let Err(error) = self
                .bus
                .broadcast(channels::REGISTRY_REGISTRATION_REQUEST, envelope)
                .await
            {
                tracing::warn!(error = %error, "registration broadcast failed");
            }

            if !temp_heartbeat_started && attempt > TEMP_HEARTBEAT_THRESHOLD {
                tracing::warn!(
                    temp_id = %temp_id,
                    attempt,
                    "exhausted {} registration attempts, beginning heartbeats under temp id",
                    TEMP_HEARTBEAT_THRESHOLD
                );
                self.spawn_heartbeat_loop(temp_id.clone());
                temp_heartbeat_started = true;
            }

            let mut registered = false;
            tokio::select! {
                reply = tokio::time::timeout(REGISTRATION_TIMEOUT, response_subscription.recv()) => {
                    match reply {
                        Ok(Some(envelope)) => {
                            match envelope.decode::<ServerRegistrationResponse>() {
                                Ok(response) if response.success => {
                                    self.finalize_registration(response).await;
                                    registered = true;
                                }
                                Ok(response) => {
                                    tracing::warn!(message = %response.message, "registration rejected, retrying");
                                }
                                Err(error) => {
                                    tracing::warn!(error = %error, "malformed registration response, retrying");
                                }
                            }
                        }
                        Ok(None) => tracing::warn!("registration response channel closed, retrying"),
                        Err(_) => tracing::warn!(temp_id = %temp_id, attempt, "no registration response within 10s"),
                    }
                }
                Some(envelope) = events_rx.recv() => {
                    self.handle_background_envelope(envelope).await;
                    continue;
                }
            }

            if registered {
                self.drain_into_self(events_rx);
                return;
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    fn drain_into_self(self: &Arc<Self>, mut events_rx: mpsc::Receiver<Envelope>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = events_rx.recv().await {
                this.handle_background_envelope(envelope).await;
            }
        });
        self.push_task(handle);
    }

    async fn handle_background_envelope(self: &Arc<Self>, envelope: Envelope) {
        match envelope.message_type.as_str() {
            "ProxyAnnouncementMessage" => {
                if let Ok(announcement) = envelope.decode::<ProxyAnnouncementMessage>() {
                    *self.proxy.write().await = Some(announcement);
                }
            }
            "ServerAnnouncementMessage" => {
                if let Ok(announcement) = envelope.decode::<ServerAnnouncementMessage>() {
                    self.announcements.record(announcement);
                }
            }
            "ServerEvacuationRequest" => {
                if let Ok(request) = envelope.decode::<ServerEvacuationRequest>() {
                    self.handle_evacuation(request).await;
                }
            }
            "RegistryReregistrationRequest" => {
                if envelope.decode::<RegistryReregistrationRequest>().is_ok() {
                    self.reregister().await;
                }
            }
            other => {
                tracing::debug!(message_type = other, "ignoring unrecognized envelope");
            }
        }
    }

    async fn finalize_registration(self: &Arc<Self>, response: ServerRegistrationResponse) {
        let assigned = response
            .assigned_server_id
            .unwrap_or_else(|| response.temp_id.clone());
        {
            let mut identity = self.identity.write().await;
            identity.server_id = assigned.clone();
            identity.status = ServerStatus::Ready;
            identity.last_heartbeat_at = self.clock.now_millis();
        }
        if let Some(proxy_id) = response.proxy_id {
            *self.bound_proxy_id.write().await = Some(proxy_id);
        }
        tracing::info!(server_id = %assigned, "registration succeeded");

        for channel in [
            channels::server_channel(&assigned),
            channels::server_reregister_channel(&assigned),
            channels::response_channel(&assigned),
        ] {
            let mut subscription = self.bus.subscribe(&channel);
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move {
                while let Some(envelope) = subscription.recv().await {
                    this.handle_background_envelope(envelope).await;
                }
            });
            self.push_task(handle);
        }

        self.spawn_heartbeat_loop(assigned.clone());
        self.publish_heartbeat(&assigned).await;
        self.publish_announcement(&assigned).await;
        self.bus.refresh_server_identity();
    }

    fn spawn_heartbeat_loop(self: &Arc<Self>, server_id: String) {
        let this = Arc::clone(self);
        let interval = self.heartbeat_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.publish_heartbeat(&server_id).await;
            }
        });
        self.push_task(handle);
    }

    async fn publish_heartbeat(&self, server_id: &str) {
        let identity = self.identity.read().await;
        let heartbeat = ServerHeartbeatMessage {
            server_id: server_id.to_string(),
            server_type: identity.server_type,
            tps: self.tps.load(Ordering::Relaxed) as f32 / 100.0,
            player_count: self.player_count.load(Ordering::Relaxed),
            max_capacity: identity.caps.hard_cap,
            uptime_ms: (self.clock.now_millis() - self.started_at_millis).max(0) as u64,
            role: identity.family.clone(),
            available_pools: Vec::new(),
            status: None,
        };
        drop(identity);
        let envelope = self.envelope("ServerHeartbeatMessage", server_id, &heartbeat);
        if let Err(error) = self.bus.broadcast(channels::SERVER_HEARTBEAT, envelope).await {
            tracing::warn!(error = %error, "heartbeat publish failed");
        } else {
            self.identity.write().await.last_heartbeat_at = self.clock.now_millis();
        }
    }

    async fn publish_announcement(&self, server_id: &str) {
        let identity = self.identity.read().await;
        let announcement = ServerAnnouncementMessage {
            server_id: server_id.to_string(),
            server_type: identity.server_type,
            environment: identity.family.clone(),
            role: identity.family.clone(),
            max_capacity: identity.caps.hard_cap,
            address: identity.address.clone(),
            port: identity.port,
        };
        drop(identity);
        let envelope = self.envelope("ServerAnnouncementMessage", server_id, &announcement);
        if let Err(error) = self
            .bus
            .broadcast(channels::SERVER_ANNOUNCEMENT, envelope)
            .await
        {
            tracing::warn!(error = %error, "announcement publish failed");
        }
    }

    async fn reregister(self: &Arc<Self>) {
        let (request, server_id, instance_uuid) = {
            let identity = self.identity.read().await;
            (
                ServerRegistrationRequest {
                    server_id: identity.server_id.clone(),
                    server_type: identity.server_type,
                    role: identity.family.clone(),
                    address: identity.address.clone(),
                    port: identity.port,
                    max_capacity: identity.caps.hard_cap,
                    family: Some(identity.family.clone()),
                },
                identity.server_id.clone(),
                identity.instance_uuid.to_string(),
            )
        };
        tracing::info!(server_id = %server_id, "re-registering after registry restart");
        let envelope = self.envelope("ServerRegistrationRequest", &instance_uuid, &request);
        if let Err(error) = self
            .bus
            .broadcast(channels::REGISTRY_REGISTRATION_REQUEST, envelope)
            .await
        {
            tracing::warn!(error = %error, "re-registration broadcast failed");
        }
    }

    /// Handles an evacuation request directed at this server (§4.C).
    /// Ignores requests for other servers — evacuation requests are
    /// broadcast and each agent filters by its own id.
    async fn handle_evacuation(self: &Arc<Self>, request: ServerEvacuationRequest) {
        let server_id = self.server_id().await;
        if request.server_id != server_id {
            return;
        }
        tracing::info!(server_id = %server_id, reason = %request.reason, "evacuating");

        let players = self.roster.current_players().await;
        let mut evacuated = 0u32;
        let mut failed = 0u32;
        for player_id in players {
            match self.announcements.pick_evacuation_target(&server_id) {
                Some(target) => {
                    let route = PlayerRouteRequest {
                        player_id: player_id.clone(),
                        from_server_id: server_id.clone(),
                        reason: request.reason.clone(),
                    };
                    let channel = channels::player_route_channel(&target);
                    let envelope = self.envelope("PlayerRouteRequest", &server_id, &route);
                    match self.bus.broadcast(&channel, envelope).await {
                        Ok(()) => evacuated += 1,
                        Err(error) => {
                            tracing::warn!(
                                player_id = %player_id, error = %error,
                                "evacuation transport request failed, disconnecting player"
                            );
                            self.roster
                                .disconnect(&player_id, "Server is shutting down")
                                .await;
                            failed += 1;
                        }
                    }
                }
                None => {
                    tracing::warn!(player_id = %player_id, "no evacuation target available");
                    self.roster
                        .disconnect(&player_id, "No available server to transfer to")
                        .await;
                    failed += 1;
                }
            }
        }

        let response = ServerEvacuationResponse {
            server_id: server_id.clone(),
            ok: failed == 0,
            evacuated,
            failed,
            message: format!("{evacuated} evacuated, {failed} failed"),
        };
        let envelope = self.envelope("ServerEvacuationResponse", &server_id, &response);
        if let Err(error) = self
            .bus
            .broadcast(channels::SERVER_EVACUATION_RESPONSE, envelope)
            .await
        {
            tracing::warn!(error = %error, "evacuation response publish failed");
        }
    }

    /// Shuts the agent down cleanly (§4.C): cancels background tasks,
    /// announces removal, sends a terminal heartbeat, and deregisters from
    /// the bound proxy if one exists.
    pub async fn shutdown(self: &Arc<Self>) {
        let (server_id, server_type, family, caps) = {
            let mut identity = self.identity.write().await;
            identity.status = ServerStatus::Stopping;
            (
                identity.server_id.clone(),
                identity.server_type,
                identity.family.clone(),
                identity.caps,
            )
        };
        tracing::info!(server_id = %server_id, "shutting down");

        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }

        let removal = ServerRemovalNotification {
            server_id: server_id.clone(),
            server_type,
            reason: RemovalReason::Shutdown,
        };
        let envelope = self.envelope("ServerRemovalNotification", &server_id, &removal);
        let _ = self.bus.broadcast(channels::SERVER_REMOVED, envelope).await;

        let terminal_heartbeat = ServerHeartbeatMessage {
            server_id: server_id.clone(),
            server_type,
            tps: 0.0,
            player_count: self.player_count.load(Ordering::Relaxed),
            max_capacity: caps.hard_cap,
            uptime_ms: (self.clock.now_millis() - self.started_at_millis).max(0) as u64,
            role: family,
            available_pools: Vec::new(),
            status: Some("SHUTDOWN".to_string()),
        };
        let envelope = self.envelope("ServerHeartbeatMessage", &server_id, &terminal_heartbeat);
        let _ = self.bus.broadcast(channels::SERVER_HEARTBEAT, envelope).await;

        if let Some(proxy_id) = self.bound_proxy_id.read().await.clone() {
            let channel = channels::server_channel(&proxy_id);
            let envelope = self.envelope(
                "ServerDeregistration",
                &server_id,
                &serde_json::json!({ "deregister": server_id }),
            );
            let _ = self.bus.broadcast(&channel, envelope).await;
        }

        self.identity.write().await.status = ServerStatus::Offline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::LocalBus;
    use protocol::FixedClock;

    fn agent(clock: FixedClock) -> (Arc<ServerLifecycleAgent>, Arc<LocalBus>) {
        let bus = Arc::new(LocalBus::default());
        let agent = ServerLifecycleAgent::boot(
            bus.clone(),
            Arc::new(clock),
            Arc::new(EmptyRoster),
            AgentConfig {
                environment_path: std::path::PathBuf::from("/nonexistent/ENVIRONMENT"),
                ..AgentConfig::default()
            },
        );
        (agent, bus)
    }

    #[tokio::test]
    async fn registers_and_starts_heartbeating() {
        let clock = FixedClock::new(0);
        let (agent, bus) = agent(clock);
        let temp_id = agent.server_id().await;

        let mut registry = bus.subscribe(channels::REGISTRY_REGISTRATION_REQUEST);
        let mut heartbeats = bus.subscribe(channels::SERVER_HEARTBEAT);
        let mut announcements = bus.subscribe(channels::SERVER_ANNOUNCEMENT);

        let run_handle = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run().await })
        };

        let request_envelope = registry.recv().await.expect("registration request sent");
        let request = request_envelope
            .decode::<ServerRegistrationRequest>()
            .unwrap();
        assert_eq!(request.server_id, temp_id);

        let response = ServerRegistrationResponse {
            temp_id: temp_id.clone(),
            success: true,
            assigned_server_id: Some("lobby-0".to_string()),
            proxy_id: Some("fulcrum-proxy-0".to_string()),
            message: "ok".to_string(),
        };
        let envelope = Envelope::new(
            "ServerRegistrationResponse",
            "registry",
            0,
            &response,
        )
        .unwrap();
        bus.broadcast(
            &channels::server_registration_response_for(&temp_id),
            envelope,
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), run_handle)
            .await
            .expect("run() completes once registered")
            .unwrap();

        assert_eq!(agent.server_id().await, "lobby-0");

        let heartbeat = tokio::time::timeout(Duration::from_secs(1), heartbeats.recv())
            .await
            .expect("heartbeat published")
            .unwrap()
            .decode::<ServerHeartbeatMessage>()
            .unwrap();
        assert_eq!(heartbeat.server_id, "lobby-0");

        let announcement = tokio::time::timeout(Duration::from_secs(1), announcements.recv())
            .await
            .expect("announcement published")
            .unwrap()
            .decode::<ServerAnnouncementMessage>()
            .unwrap();
        assert_eq!(announcement.server_id, "lobby-0");
    }

    #[tokio::test]
    async fn shutdown_broadcasts_removal_and_terminal_heartbeat() {
        let clock = FixedClock::new(0);
        let (agent, bus) = agent(clock);

        let mut removed = bus.subscribe(channels::SERVER_REMOVED);
        agent.shutdown().await;

        let notification = tokio::time::timeout(Duration::from_secs(1), removed.recv())
            .await
            .expect("removal notification published")
            .unwrap()
            .decode::<ServerRemovalNotification>()
            .unwrap();
        assert_eq!(notification.reason, RemovalReason::Shutdown);
    }
}
