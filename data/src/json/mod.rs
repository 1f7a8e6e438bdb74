//! The JSON document backend (§4.G1, §6 "JSON on-disk layout"): one file
//! per document under `<base>/<collection>/<id>.json`, atomic writes via a
//! temp file + rename, a per-collection reader-writer lock, an LRU cache in
//! front, and a `.index` file tracking known ids for O(1) count.
//!
//! One file per record, with `fs::rename` for atomic publish of a built
//! artifact rather than an in-place write.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use tokio::sync::RwLock as AsyncRwLock;
use uuid::Uuid;

use crate::backend::{PlayerDataBackend, PlayerRecord};
use crate::error::{DataError, DataResult};
use crate::filter::Filter;
use crate::page::{Page, Pagination};
use crate::schema::{PlayerData, SchemaRegistry};

const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Hash, PartialEq, Eq, Clone)]
struct CacheKey {
    collection: String,
    player_id: Uuid,
}

pub struct JsonDocumentBackend {
    base_dir: PathBuf,
    schemas: Arc<SchemaRegistry>,
    collection_locks: DashMap<String, Arc<AsyncRwLock<()>>>,
    cache: Mutex<LruCache<CacheKey, PlayerData>>,
}

impl JsonDocumentBackend {
    pub fn new(base_dir: impl Into<PathBuf>, schemas: Arc<SchemaRegistry>) -> Self {
        Self::with_cache_capacity(base_dir, schemas, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(base_dir: impl Into<PathBuf>, schemas: Arc<SchemaRegistry>, capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        JsonDocumentBackend {
            base_dir: base_dir.into(),
            schemas,
            collection_locks: DashMap::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock_for(&self, collection: &str) -> Arc<AsyncRwLock<()>> {
        self.collection_locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(AsyncRwLock::new(())))
            .clone()
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.base_dir.join(collection)
    }

    fn doc_path(&self, collection: &str, player_id: Uuid) -> PathBuf {
        self.collection_dir(collection).join(format!("{player_id}.json"))
    }

    fn tmp_path(&self, collection: &str, player_id: Uuid) -> PathBuf {
        self.collection_dir(collection).join(format!("{player_id}.tmp"))
    }

    fn index_path(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).join(".index")
    }

    async fn read_document(&self, collection: &str, player_id: Uuid) -> DataResult<Option<PlayerData>> {
        let path = self.doc_path(collection, player_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(DataError::Io(error)),
        }
    }

    async fn write_document_atomic(&self, collection: &str, player_id: Uuid, data: &PlayerData) -> DataResult<()> {
        let dir = self.collection_dir(collection);
        tokio::fs::create_dir_all(&dir).await?;
        let tmp = self.tmp_path(collection, player_id);
        let final_path = self.doc_path(collection, player_id);
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &final_path).await?;
        Ok(())
    }

    async fn append_index(&self, collection: &str, player_id: Uuid) {
        if let Err(error) = self.append_index_fallible(collection, player_id).await {
            tracing::warn!(collection, %player_id, error = %error, "document index update failed");
        }
    }

    async fn append_index_fallible(&self, collection: &str, player_id: Uuid) -> DataResult<()> {
        let path = self.index_path(collection);
        let mut ids = load_index(&path).await?;
        if ids.insert(player_id.to_string()) {
            let contents = ids.into_iter().collect::<Vec<_>>().join("\n");
            tokio::fs::write(&path, contents).await?;
        }
        Ok(())
    }

    async fn list_ids(&self, collection: &str) -> DataResult<Vec<Uuid>> {
        let index = load_index(&self.index_path(collection)).await?;
        if !index.is_empty() {
            return Ok(index.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect());
        }
        // Index missing or stale (non-critical per §4.G1): fall back to a
        // directory scan.
        let dir = self.collection_dir(collection);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(DataError::Io(error)),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(stem) = entry.path().file_stem().and_then(|stem| stem.to_str()) {
                if entry.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    fn cache_get(&self, collection: &str, player_id: Uuid) -> Option<PlayerData> {
        let key = CacheKey {
            collection: collection.to_string(),
            player_id,
        };
        self.cache.lock().expect("cache mutex poisoned").get(&key).cloned()
    }

    fn cache_put(&self, collection: &str, player_id: Uuid, data: PlayerData) {
        let key = CacheKey {
            collection: collection.to_string(),
            player_id,
        };
        self.cache.lock().expect("cache mutex poisoned").put(key, data);
    }
}

async fn load_index(path: &Path) -> DataResult<HashSet<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(error) => Err(DataError::Io(error)),
    }
}

#[async_trait]
impl PlayerDataBackend for JsonDocumentBackend {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn load(&self, player_id: Uuid, schema: &str) -> DataResult<Option<PlayerData>> {
        let descriptor = self.schemas.get(schema)?;
        if let Some(cached) = self.cache_get(&descriptor.collection, player_id) {
            return Ok(Some(cached));
        }
        let lock = self.lock_for(&descriptor.collection);
        let _guard = lock.read().await;
        let loaded = self.read_document(&descriptor.collection, player_id).await?;
        if let Some(data) = &loaded {
            self.cache_put(&descriptor.collection, player_id, data.clone());
        }
        Ok(loaded)
    }

    async fn save(&self, player_id: Uuid, schema: &str, data: &PlayerData) -> DataResult<()> {
        let descriptor = self.schemas.get(schema)?;
        let lock = self.lock_for(&descriptor.collection);
        let _guard = lock.write().await;
        self.write_document_atomic(&descriptor.collection, player_id, data).await?;
        self.append_index(&descriptor.collection, player_id).await;
        self.cache_put(&descriptor.collection, player_id, data.clone());
        Ok(())
    }

    async fn save_batch(&self, batch: &HashMap<Uuid, HashMap<String, PlayerData>>) -> DataResult<usize> {
        let mut persisted = 0;
        for (player_id, schemas) in batch {
            for (schema, data) in schemas {
                // No cross-document transaction exists for a file store;
                // unlike the SQL backend this does not roll back partial
                // progress on a later failure (see DESIGN.md).
                if self.save(*player_id, schema, data).await.is_ok() {
                    persisted += 1;
                } else {
                    tracing::warn!(%player_id, schema, "batch save failed for one entry");
                }
            }
        }
        Ok(persisted)
    }

    async fn query(&self, schema: &str, filters: &[Filter], pagination: Pagination) -> DataResult<Page<PlayerRecord>> {
        let descriptor = self.schemas.get(schema)?;
        let lock = self.lock_for(&descriptor.collection);
        let _guard = lock.read().await;
        let ids = self.list_ids(&descriptor.collection).await?;

        let mut matched = Vec::new();
        for id in ids {
            let data = match self.cache_get(&descriptor.collection, id) {
                Some(data) => data,
                None => match self.read_document(&descriptor.collection, id).await? {
                    Some(data) => {
                        self.cache_put(&descriptor.collection, id, data.clone());
                        data
                    }
                    None => continue,
                },
            };
            if filters.iter().all(|filter| filter.matches(&data)) {
                matched.push(PlayerRecord { player_id: id, data });
            }
        }

        let total = matched.len() as u64;
        let page_items = matched
            .into_iter()
            .skip(pagination.offset)
            .take(if pagination.limit == 0 { usize::MAX } else { pagination.limit })
            .collect();

        Ok(Page {
            items: page_items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    fn supports_native_queries(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, FieldType, SchemaDescriptor};

    fn registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry.register(
            SchemaDescriptor::builder("profiles")
                .field(FieldDescriptor::new("level", "level", FieldType::Integer))
                .build(),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonDocumentBackend::new(dir.path(), registry());
        let player_id = Uuid::new_v4();
        let mut data = PlayerData::new();
        data.insert("level".to_string(), serde_json::json!(42));

        backend.save(player_id, "profiles", &data).await.unwrap();
        let loaded = backend.load(player_id, "profiles").await.unwrap().unwrap();
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn load_missing_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonDocumentBackend::new(dir.path(), registry());
        assert!(backend.load(Uuid::new_v4(), "profiles").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonDocumentBackend::new(dir.path(), registry());
        for level in [5, 15, 25] {
            let mut data = PlayerData::new();
            data.insert("level".to_string(), serde_json::json!(level));
            backend.save(Uuid::new_v4(), "profiles", &data).await.unwrap();
        }

        let filter = Filter::structured("level", crate::filter::FilterOperator::GreaterThan, 10);
        let page = backend
            .query("profiles", &[filter], Pagination::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonDocumentBackend::new(dir.path(), registry());
        let player_id = Uuid::new_v4();
        let mut data = PlayerData::new();
        data.insert("level".to_string(), serde_json::json!(1));
        backend.save(player_id, "profiles", &data).await.unwrap();
        assert!(!backend.tmp_path("profiles", player_id).exists());
        assert!(backend.doc_path("profiles", player_id).exists());
    }
}
