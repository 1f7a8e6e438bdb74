mod admin;
mod app_state;
mod sink;
mod watchdog;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protocol::{Clock, SystemClock};

use bus::{Bus, LocalBus};
use data::{BackendRegistry, StorageManager, StorageManagerConfig};
use kv::{LocalKv, SharedKv};
use party::{PartyCoordinator, PartyRepository};
use registry::RegistryService;
use reservation::{FamilyVariantCatalog, ReservationService};

use crate::app_state::AppState;
use crate::sink::PartyCoordinatorSink;

/// Wires the message bus, the shared KV store, and the registry/party/
/// reservation/data services together behind one `Arc<AppState>`, spawns a
/// background task per periodic sweep, and serves a tiny admin surface.
/// This binary is illustrative wiring, not a product surface — config
/// loading and console commands stay out of scope (§1).
#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let bus = build_bus().await;
    let kv = build_kv().await;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = RegistryService::new(bus.clone(), clock.clone());
    tokio::spawn({
        let registry = registry.clone();
        async move { registry.run().await }
    });

    let party_repository = PartyRepository::new(kv.clone());
    let party = PartyCoordinator::new(party_repository, bus.clone(), clock.clone());

    let reservation = Arc::new(ReservationService::new(
        kv.clone(),
        bus.clone(),
        clock.clone(),
        PartyCoordinatorSink::new(party.clone()),
        FamilyVariantCatalog::new(),
    ));

    let backends = Arc::new(BackendRegistry::new());
    let storage_config = StorageManagerConfig {
        time_based_persistence: true,
        event_based_persistence: true,
        ..StorageManagerConfig::default()
    };
    let storage = StorageManager::new(backends, clock.clone(), storage_config);
    storage.initialize().await;

    let started_at_millis = clock.now_millis();
    let state = Arc::new(AppState {
        bus,
        kv,
        clock,
        registry,
        party,
        reservation,
        storage,
        started_at_millis,
    });

    watchdog::spawn_liveness_sweep(state.clone());
    watchdog::spawn_party_maintenance(state.clone());

    let app = Router::new()
        .route("/healthz", get(admin::healthz))
        .route("/status", get(admin::status))
        .with_state(state);

    let bind_addr =
        std::env::var("FULCRUM_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|error| panic!("failed to bind {bind_addr}: {error}"));

    tracing::info!(bind_addr, "control plane listening");
    axum::serve(listener, app).await.unwrap();
}

#[cfg(feature = "redis-backend")]
async fn build_bus() -> Arc<dyn Bus> {
    match std::env::var("FULCRUM_REDIS_URL") {
        Ok(url) => match bus::RedisBus::connect(&url).await {
            Ok(redis_bus) => {
                tracing::info!(url, "connected message bus to redis");
                Arc::new(redis_bus)
            }
            Err(error) => {
                tracing::error!(%error, url, "failed to connect redis bus, falling back to in-process bus");
                Arc::new(LocalBus::new())
            }
        },
        Err(_) => Arc::new(LocalBus::new()),
    }
}

#[cfg(not(feature = "redis-backend"))]
async fn build_bus() -> Arc<dyn Bus> {
    Arc::new(LocalBus::new())
}

#[cfg(feature = "redis-backend")]
async fn build_kv() -> Arc<dyn SharedKv> {
    match std::env::var("FULCRUM_REDIS_URL") {
        Ok(url) => match kv::RedisKv::connect(&url).await {
            Ok(redis_kv) => {
                tracing::info!(url, "connected shared kv store to redis");
                Arc::new(redis_kv)
            }
            Err(error) => {
                tracing::error!(%error, url, "failed to connect redis kv, falling back to in-process store");
                Arc::new(LocalKv::new())
            }
        },
        Err(_) => Arc::new(LocalKv::new()),
    }
}

#[cfg(not(feature = "redis-backend"))]
async fn build_kv() -> Arc<dyn SharedKv> {
    Arc::new(LocalKv::new())
}
