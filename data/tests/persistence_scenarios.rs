//! End-to-end dirty-tracking + persistence scenario (§8): `markDirty` then
//! `persistAllDirtyData` makes the backend's stored value equal to what was
//! marked, and replaying the flush with no intervening write returns zero.

use std::sync::Arc;

use data::dirty::BackendRegistry;
use data::schema::{FieldDescriptor, FieldType, SchemaDescriptor, SchemaRegistry};
use data::sql::{SqlBackend, SqliteDialect};
use data::{PlayerData, PlayerDataBackend, StorageManager, StorageManagerConfig};
use protocol::{Clock, FixedClock};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use uuid::Uuid;

#[tokio::test]
async fn dirty_write_survives_a_persistence_sweep_and_replay_is_idempotent() {
    install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite connects");

    let mut registry = SchemaRegistry::new();
    registry.register(
        SchemaDescriptor::builder("profiles")
            .field(FieldDescriptor::new("level", "level", FieldType::Integer))
            .build(),
    );
    let schemas = Arc::new(registry);

    let backend = Arc::new(SqlBackend::new(pool, "conn", Arc::new(SqliteDialect), schemas));
    backend.migrate().await.unwrap();

    let backends = Arc::new(BackendRegistry::new());
    backends.register("profiles", backend.clone() as Arc<dyn PlayerDataBackend>);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let manager = StorageManager::new(backends, clock, StorageManagerConfig::default());

    let player_id = Uuid::new_v4();
    let mut data = PlayerData::new();
    data.insert("level".to_string(), serde_json::json!(42));

    manager
        .save_with_dirty_tracking(player_id, "profiles", data.clone(), false)
        .await
        .unwrap();
    assert_eq!(manager.dirty_manager().dirty_count(player_id), 1);

    let persisted = manager.dirty_manager().persist_all_dirty_data().await;
    assert_eq!(persisted, 1);

    let loaded = backend.load(player_id, "profiles").await.unwrap().unwrap();
    assert_eq!(loaded.get("level"), data.get("level"));

    let replayed = manager.dirty_manager().persist_all_dirty_data().await;
    assert_eq!(replayed, 0);
}
