//! The storage-manager lifecycle (§4.G2): owns the
//! `{dirtyTrackingEnabled, persistenceIntervalMinutes, eventBasedPersistence,
//! timeBasedPersistence}` configuration and the single time-based
//! persistence worker. A plain long-lived object constructed at startup and
//! passed by reference — not a process-wide global.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use protocol::Clock;

use crate::backend::ChangeType;
use crate::dirty::{BackendRegistry, DirtyDataManager};
use crate::error::{DataError, DataResult};
use crate::schema::PlayerData;

/// Default persistence cadence (§4.G2: "persistenceIntervalMinutes(default
/// 5)").
pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// The per-player event-based throttle ceiling (§4.G2: "throttled: …gates
/// successive triggers by `min(30_000 ms, interval/10)`").
const EVENT_THROTTLE_CEILING_MS: i64 = 30_000;

#[derive(Debug, Clone)]
pub struct StorageManagerConfig {
    pub dirty_tracking_enabled: bool,
    pub persistence_interval: Duration,
    pub event_based_persistence: bool,
    pub time_based_persistence: bool,
}

impl Default for StorageManagerConfig {
    fn default() -> Self {
        StorageManagerConfig {
            dirty_tracking_enabled: true,
            persistence_interval: DEFAULT_PERSISTENCE_INTERVAL,
            event_based_persistence: false,
            time_based_persistence: false,
        }
    }
}

fn event_throttle_ms(interval: Duration) -> i64 {
    let tenth = (interval.as_millis() / 10) as i64;
    EVENT_THROTTLE_CEILING_MS.min(tenth.max(1))
}

/// Owns dirty tracking, the time-based persistence worker, and the
/// event-based throttle. A single instance is constructed at startup and
/// shared (via `Arc`) with every caller that saves player data.
pub struct StorageManager {
    config: RwLock<StorageManagerConfig>,
    dirty: Arc<DirtyDataManager>,
    backends: Arc<BackendRegistry>,
    clock: Arc<dyn Clock>,
    last_persisted_at: DashMap<Uuid, AtomicI64>,
    time_based_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StorageManager {
    pub fn new(backends: Arc<BackendRegistry>, clock: Arc<dyn Clock>, config: StorageManagerConfig) -> Arc<Self> {
        let dirty = DirtyDataManager::new(backends.clone(), clock.clone());
        Arc::new(StorageManager {
            config: RwLock::new(config),
            dirty,
            backends,
            clock,
            last_persisted_at: DashMap::new(),
            time_based_task: tokio::sync::Mutex::new(None),
        })
    }

    pub fn dirty_manager(&self) -> &Arc<DirtyDataManager> {
        &self.dirty
    }

    /// Starts the configured lifecycle (time-based worker if enabled).
    /// Mirrors the source's `initialize(flag)` entry point.
    pub async fn initialize(self: &Arc<Self>) {
        let time_based = self.config.read().await.time_based_persistence;
        if time_based {
            self.set_time_based_persistence(true).await;
        }
    }

    pub async fn set_dirty_tracking_enabled(&self, enabled: bool) {
        self.config.write().await.dirty_tracking_enabled = enabled;
    }

    pub async fn set_event_based_persistence(&self, enabled: bool) {
        self.config.write().await.event_based_persistence = enabled;
    }

    /// Starts (or stops) the single scheduled worker that calls
    /// `persist_all_dirty_data` every `persistence_interval`. While the
    /// storage manager owns this timer, [`DirtyDataManager`] never runs one
    /// of its own (§4.G2 "Coordination") — it exposes no such loop itself.
    pub async fn set_time_based_persistence(self: &Arc<Self>, enabled: bool) {
        self.config.write().await.time_based_persistence = enabled;
        let mut task_slot = self.time_based_task.lock().await;
        if let Some(existing) = task_slot.take() {
            existing.abort();
        }
        if enabled {
            let manager = self.clone();
            let interval = self.config.read().await.persistence_interval;
            *task_slot = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // first tick fires immediately; skip it
                loop {
                    ticker.tick().await;
                    let persisted = manager.dirty.persist_all_dirty_data().await;
                    tracing::info!(persisted, "time-based persistence sweep complete");
                }
            }));
        }
    }

    /// `saveWithDirtyTracking(player, schema, data, immediate)`.
    pub async fn save_with_dirty_tracking(
        &self,
        player_id: Uuid,
        schema_key: &str,
        data: PlayerData,
        immediate: bool,
    ) -> DataResult<()> {
        let config = self.config.read().await.clone();
        if immediate || !config.dirty_tracking_enabled {
            let backend = self
                .backends
                .get(schema_key)
                .ok_or_else(|| DataError::UnknownSchema(schema_key.to_string()))?;
            return backend.save(player_id, schema_key, &data).await;
        }

        self.dirty.mark_dirty(player_id, schema_key, data, ChangeType::Update);

        if config.event_based_persistence {
            let now = self.clock.now_millis();
            let throttle_ms = event_throttle_ms(config.persistence_interval);
            let should_flush = match self.last_persisted_at.get(&player_id) {
                Some(last) => now - last.load(Ordering::SeqCst) >= throttle_ms,
                None => true,
            };
            if should_flush {
                self.last_persisted_at
                    .entry(player_id)
                    .or_insert_with(|| AtomicI64::new(0))
                    .store(now, Ordering::SeqCst);
                self.dirty.persist_dirty_data_async(player_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::FixedClock;

    #[test]
    fn event_throttle_is_capped_at_30_seconds() {
        assert_eq!(event_throttle_ms(Duration::from_secs(600)), 30_000);
    }

    #[test]
    fn event_throttle_scales_down_for_short_intervals() {
        assert_eq!(event_throttle_ms(Duration::from_secs(60)), 6_000);
    }

    #[tokio::test]
    async fn immediate_save_bypasses_dirty_tracking() {
        use std::collections::HashMap;
        use async_trait::async_trait;
        use crate::backend::{PlayerDataBackend, PlayerRecord};
        use crate::error::DataResult;
        use crate::filter::Filter;
        use crate::page::{Page, Pagination};
        use std::sync::Mutex;

        #[derive(Default)]
        struct RecordingBackend {
            saved: Mutex<Vec<(Uuid, String)>>,
        }

        #[async_trait]
        impl PlayerDataBackend for RecordingBackend {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            async fn load(&self, _player_id: Uuid, _schema: &str) -> DataResult<Option<PlayerData>> {
                Ok(None)
            }
            async fn save(&self, player_id: Uuid, schema: &str, _data: &PlayerData) -> DataResult<()> {
                self.saved.lock().unwrap().push((player_id, schema.to_string()));
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

        let backends = Arc::new(BackendRegistry::new());
        let backend = Arc::new(RecordingBackend::default());
        backends.register("profiles", backend.clone());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let manager = StorageManager::new(backends, clock, StorageManagerConfig::default());

        let player_id = Uuid::new_v4();
        manager
            .save_with_dirty_tracking(player_id, "profiles", PlayerData::new(), true)
            .await
            .unwrap();

        assert_eq!(backend.saved.lock().unwrap().len(), 1);
        assert_eq!(manager.dirty_manager().dirty_count(player_id), 0);
    }

    #[tokio::test]
    async fn non_immediate_save_marks_dirty_without_persisting() {
        let backends = Arc::new(BackendRegistry::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let manager = StorageManager::new(backends, clock, StorageManagerConfig::default());
        let player_id = Uuid::new_v4();

        manager
            .save_with_dirty_tracking(player_id, "profiles", PlayerData::new(), false)
            .await
            .unwrap();

        assert_eq!(manager.dirty_manager().dirty_count(player_id), 1);
    }
}
