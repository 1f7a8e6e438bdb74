//! `PlayerDataBackend` (§4.G1): the storage abstraction both the SQL and
//! JSON document backends implement.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DataResult;
use crate::filter::Filter;
use crate::page::{Page, Pagination};
use crate::schema::PlayerData;

/// One loaded record: the player it belongs to plus its data bag.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub player_id: Uuid,
    pub data: PlayerData,
}

/// A schema-keyed change type, mirroring the dirty-entry taxonomy (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

#[async_trait]
pub trait PlayerDataBackend: Send + Sync + std::any::Any {
    /// Supports the cross-schema executor's "do these schemas share a SQL
    /// connection?" check (§4.G3) without a reflection-style mapping layer
    /// — just a downcast to the one concrete type that matters,
    /// `sql::SqlBackend`.
    fn as_any(&self) -> &dyn std::any::Any;

    async fn load(&self, player_id: Uuid, schema: &str) -> DataResult<Option<PlayerData>>;

    async fn save(&self, player_id: Uuid, schema: &str, data: &PlayerData) -> DataResult<()>;

    /// Loads the record, or saves and returns `default` if none exists.
    async fn load_or_create(
        &self,
        player_id: Uuid,
        schema: &str,
        default: PlayerData,
    ) -> DataResult<PlayerData> {
        match self.load(player_id, schema).await? {
            Some(existing) => Ok(existing),
            None => {
                self.save(player_id, schema, &default).await?;
                Ok(default)
            }
        }
    }

    /// Saves many players' many schemas in one call. Returns the number of
    /// `(player, schema)` entries actually persisted; backends that support
    /// a native transaction roll back to 0 on any failure (§4.G1, §7).
    async fn save_batch(&self, batch: &HashMap<Uuid, HashMap<String, PlayerData>>) -> DataResult<usize>;

    /// The field-level optimization §9 flags as a TODO: ships as a full-row
    /// save, returning `false` on failure instead of propagating, matching
    /// the §7 contract for this specific call.
    async fn save_changed_fields(
        &self,
        player_id: Uuid,
        schema: &str,
        data: &PlayerData,
        changed_fields: &[String],
    ) -> bool {
        let _ = changed_fields;
        self.save(player_id, schema, data).await.is_ok()
    }

    async fn query(
        &self,
        schema: &str,
        filters: &[Filter],
        pagination: Pagination,
    ) -> DataResult<Page<PlayerRecord>>;

    fn supports_native_queries(&self) -> bool;

    /// Whether this backend can evaluate `LIKE`/`STARTS_WITH`/`ENDS_WITH`
    /// natively (§4.G3 step 2). JSON/document backends always load-then-
    /// filter so they report `true` too — the cost is identical to any
    /// other pushdown from their point of view.
    fn supports_string_operators(&self) -> bool {
        true
    }
}
