//! Dirty tracking (§4.G2): a cache mapping `playerId -> schemaKey ->
//! DirtyEntry`, flushed by resolving each key's backend and calling
//! `save`. Last write to a `(playerId, schemaKey)` pair wins.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use protocol::Clock;

use crate::backend::{ChangeType, PlayerDataBackend};
use crate::schema::PlayerData;

/// One pending write (§3 "Dirty entry").
#[derive(Debug, Clone)]
pub struct DirtyEntry {
    pub player_id: Uuid,
    pub schema_key: String,
    pub data: PlayerData,
    pub change_type: ChangeType,
    pub enqueued_at: i64,
}

/// A concurrent map from schema key to its backend, computed once at
/// startup and never mutated afterward (§5).
#[derive(Default)]
pub struct BackendRegistry {
    backends: DashMap<String, Arc<dyn PlayerDataBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry::default()
    }

    pub fn register(&self, schema_key: impl Into<String>, backend: Arc<dyn PlayerDataBackend>) {
        self.backends.insert(schema_key.into(), backend);
    }

    pub fn get(&self, schema_key: &str) -> Option<Arc<dyn PlayerDataBackend>> {
        self.backends.get(schema_key).map(|entry| entry.clone())
    }
}

pub struct DirtyDataManager {
    cache: DashMap<Uuid, DashMap<String, DirtyEntry>>,
    backends: Arc<BackendRegistry>,
    clock: Arc<dyn Clock>,
}

impl DirtyDataManager {
    pub fn new(backends: Arc<BackendRegistry>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(DirtyDataManager {
            cache: DashMap::new(),
            backends,
            clock,
        })
    }

    /// `markDirty(player, schemaKey, data, type)`: inserts or replaces the
    /// entry for `(player_id, schema_key)` — last write wins.
    pub fn mark_dirty(&self, player_id: Uuid, schema_key: &str, data: PlayerData, change_type: ChangeType) {
        let entry = DirtyEntry {
            player_id,
            schema_key: schema_key.to_string(),
            data,
            change_type,
            enqueued_at: self.clock.now_millis(),
        };
        self.cache
            .entry(player_id)
            .or_default()
            .insert(schema_key.to_string(), entry);
    }

    pub fn dirty_count(&self, player_id: Uuid) -> usize {
        self.cache.get(&player_id).map(|entries| entries.len()).unwrap_or(0)
    }

    /// `persistDirtyData(player)`: flushes every dirty entry for one
    /// player. Draining the player's map before saving means a second call
    /// with no intervening `mark_dirty` returns 0, matching §8's
    /// idempotence law.
    pub async fn persist_dirty_data(&self, player_id: Uuid) -> usize {
        let Some((_, entries)) = self.cache.remove(&player_id) else {
            return 0;
        };
        let mut persisted = 0;
        for (schema_key, entry) in entries {
            match self.backends.get(&schema_key) {
                Some(backend) => match backend.save(player_id, &schema_key, &entry.data).await {
                    Ok(()) => persisted += 1,
                    Err(error) => {
                        tracing::error!(%player_id, schema_key, error = %error, "dirty entry persist failed");
                    }
                },
                None => {
                    tracing::error!(%player_id, schema_key, "no backend registered for schema");
                }
            }
        }
        persisted
    }

    /// `persistAllDirtyData()`: flushes every player with at least one
    /// dirty entry. Returns the total entry count persisted.
    pub async fn persist_all_dirty_data(&self) -> usize {
        let player_ids: Vec<Uuid> = self.cache.iter().map(|entry| *entry.key()).collect();
        let mut total = 0;
        for player_id in player_ids {
            total += self.persist_dirty_data(player_id).await;
        }
        total
    }

    /// `persistDirtyDataAsync`: same as [`Self::persist_dirty_data`] but
    /// spawned on the default worker pool.
    pub fn persist_dirty_data_async(self: &Arc<Self>, player_id: Uuid) -> tokio::task::JoinHandle<usize> {
        let manager = self.clone();
        tokio::spawn(async move { manager.persist_dirty_data(player_id).await })
    }

    pub fn persist_all_dirty_data_async(self: &Arc<Self>) -> tokio::task::JoinHandle<usize> {
        let manager = self.clone();
        tokio::spawn(async move { manager.persist_all_dirty_data().await })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use protocol::FixedClock;

    use super::*;
    use crate::error::DataResult;
    use crate::filter::Filter;
    use crate::page::{Page, Pagination};
    use crate::backend::PlayerRecord;

    #[derive(Default)]
    struct RecordingBackend {
        saved: Mutex<HashMap<(Uuid, String), PlayerData>>,
    }

    #[async_trait]
    impl PlayerDataBackend for RecordingBackend {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        async fn load(&self, player_id: Uuid, schema: &str) -> DataResult<Option<PlayerData>> {
            Ok(self.saved.lock().unwrap().get(&(player_id, schema.to_string())).cloned())
        }

        async fn save(&self, player_id: Uuid, schema: &str, data: &PlayerData) -> DataResult<()> {
            self.saved.lock().unwrap().insert((player_id, schema.to_string()), data.clone());
            Ok(())
        }

        async fn save_batch(&self, _batch: &HashMap<Uuid, HashMap<String, PlayerData>>) -> DataResult<usize> {
            Ok(0)
        }

        async fn query(&self, _schema: &str, _filters: &[Filter], _pagination: Pagination) -> DataResult<Page<PlayerRecord>> {
            Ok(Page { items: Vec::new(), total: 0, offset: 0, limit: 0 })
        }

        fn supports_native_queries(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn persist_dirty_data_flushes_then_returns_zero_on_replay() {
        let backends = Arc::new(BackendRegistry::new());
        let backend = Arc::new(RecordingBackend::default());
        backends.register("profiles", backend.clone());
        let clock = Arc::new(FixedClock::new(0));
        let manager = DirtyDataManager::new(backends, clock);

        let player_id = Uuid::new_v4();
        let mut data = PlayerData::new();
        data.insert("level".to_string(), serde_json::json!(5));
        manager.mark_dirty(player_id, "profiles", data.clone(), ChangeType::Update);

        assert_eq!(manager.persist_dirty_data(player_id).await, 1);
        assert_eq!(backend.load(player_id, "profiles").await.unwrap(), Some(data));
        assert_eq!(manager.persist_dirty_data(player_id).await, 0);
    }

    #[tokio::test]
    async fn last_write_wins_for_same_key() {
        let backends = Arc::new(BackendRegistry::new());
        let backend = Arc::new(RecordingBackend::default());
        backends.register("profiles", backend.clone());
        let clock = Arc::new(FixedClock::new(0));
        let manager = DirtyDataManager::new(backends, clock);

        let player_id = Uuid::new_v4();
        let mut first = PlayerData::new();
        first.insert("level".to_string(), serde_json::json!(1));
        let mut second = PlayerData::new();
        second.insert("level".to_string(), serde_json::json!(2));

        manager.mark_dirty(player_id, "profiles", first, ChangeType::Update);
        manager.mark_dirty(player_id, "profiles", second.clone(), ChangeType::Update);
        assert_eq!(manager.dirty_count(player_id), 1);

        manager.persist_dirty_data(player_id).await;
        assert_eq!(backend.load(player_id, "profiles").await.unwrap(), Some(second));
    }
}
