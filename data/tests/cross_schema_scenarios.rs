//! End-to-end cross-schema query scenarios (§8 scenarios 5 and 6): a
//! native SQL join when every referenced schema shares one connection, and
//! an application-level UUID intersection when they don't.

use std::sync::Arc;
use std::time::Duration;

use data::dirty::BackendRegistry;
use data::filter::{Filter, FilterOperator, NullHandling, SortDirection, SortOrder};
use data::json::JsonDocumentBackend;
use data::query::builder::{CrossSchemaQueryBuilder, JoinType};
use data::query::executor::CrossSchemaExecutor;
use data::query::optimizer::{OptimizerConfig, QueryOptimizer};
use data::query::stats::SchemaStatsCache;
use data::schema::{FieldDescriptor, FieldType, SchemaDescriptor, SchemaRegistry};
use data::sql::{SqlBackend, SqliteDialect};
use data::PlayerDataBackend;
use protocol::{Clock, FixedClock};
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use uuid::Uuid;

fn registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(
        SchemaDescriptor::builder("profiles")
            .field(FieldDescriptor::new("level", "level", FieldType::Integer).indexed())
            .build(),
    );
    registry.register(
        SchemaDescriptor::builder("stats")
            .field(FieldDescriptor::new("kills", "kills", FieldType::Integer))
            .build(),
    );
    Arc::new(registry)
}

async fn shared_sqlite_pool() -> sqlx::any::AnyPool {
    install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite connects")
}

fn query_builder() -> CrossSchemaQueryBuilder {
    CrossSchemaQueryBuilder::new("profiles")
        .filter(Filter::structured("level", FilterOperator::GreaterThan, 10))
        .join("stats", JoinType::Left, vec![])
        .sort(SortOrder::new("stats", "kills", SortDirection::Descending).with_nulls(NullHandling::NullsLast))
        .limit(50)
}

#[tokio::test]
async fn sql_shared_connection_executes_a_single_native_join() {
    let schemas = registry();
    let pool = shared_sqlite_pool().await;
    let profiles = Arc::new(SqlBackend::new(pool.clone(), "conn-a", Arc::new(SqliteDialect), schemas.clone()));
    let stats = Arc::new(SqlBackend::new(pool, "conn-a", Arc::new(SqliteDialect), schemas.clone()));
    profiles.migrate().await.unwrap();
    stats.migrate().await.unwrap();

    let high_level = Uuid::new_v4();
    let low_level = Uuid::new_v4();
    let mut high_data = serde_json::Map::new();
    high_data.insert("uuid".to_string(), serde_json::json!(high_level.to_string()));
    high_data.insert("level".to_string(), serde_json::json!(15));
    profiles.save(high_level, "profiles", &high_data).await.unwrap();

    let mut low_data = serde_json::Map::new();
    low_data.insert("uuid".to_string(), serde_json::json!(low_level.to_string()));
    low_data.insert("level".to_string(), serde_json::json!(5));
    profiles.save(low_level, "profiles", &low_data).await.unwrap();

    let mut kills_data = serde_json::Map::new();
    kills_data.insert("uuid".to_string(), serde_json::json!(high_level.to_string()));
    kills_data.insert("kills".to_string(), serde_json::json!(10));
    stats.save(high_level, "stats", &kills_data).await.unwrap();

    let backends = BackendRegistry::new();
    backends.register("profiles", profiles.clone());
    backends.register("stats", stats.clone());

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let stats_cache = Arc::new(SchemaStatsCache::new(Duration::from_secs(60), clock.clone()));
    let optimizer = QueryOptimizer::new(schemas.clone(), stats_cache, clock, OptimizerConfig::default());
    let plan = optimizer.optimize(query_builder().build(), &backends).unwrap();

    let executor = CrossSchemaExecutor::new(schemas);
    let page = executor.execute(&plan, &backends).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].player_id, high_level);
    let joined_kills = page.items[0].schemas.get("stats").unwrap().get("kills").unwrap();
    assert_eq!(joined_kills, &serde_json::json!(10));
}

#[tokio::test]
async fn mixed_backends_fall_back_to_uuid_intersection_with_the_same_result() {
    let schemas = registry();
    let pool = shared_sqlite_pool().await;
    let profiles = Arc::new(SqlBackend::new(pool, "conn-b", Arc::new(SqliteDialect), schemas.clone()));
    profiles.migrate().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let stats = Arc::new(JsonDocumentBackend::new(dir.path(), schemas.clone()));

    let high_level = Uuid::new_v4();
    let low_level = Uuid::new_v4();
    let mut high_data = serde_json::Map::new();
    high_data.insert("uuid".to_string(), serde_json::json!(high_level.to_string()));
    high_data.insert("level".to_string(), serde_json::json!(15));
    profiles.save(high_level, "profiles", &high_data).await.unwrap();

    let mut low_data = serde_json::Map::new();
    low_data.insert("uuid".to_string(), serde_json::json!(low_level.to_string()));
    low_data.insert("level".to_string(), serde_json::json!(5));
    profiles.save(low_level, "profiles", &low_data).await.unwrap();

    let mut kills_data = serde_json::Map::new();
    kills_data.insert("kills".to_string(), serde_json::json!(10));
    stats.save(high_level, "stats", &kills_data).await.unwrap();

    let backends = BackendRegistry::new();
    backends.register("profiles", profiles.clone() as Arc<dyn PlayerDataBackend>);
    backends.register("stats", stats.clone() as Arc<dyn PlayerDataBackend>);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let stats_cache = Arc::new(SchemaStatsCache::new(Duration::from_secs(60), clock.clone()));
    let optimizer = QueryOptimizer::new(schemas.clone(), stats_cache, clock, OptimizerConfig::default());
    let plan = optimizer.optimize(query_builder().build(), &backends).unwrap();

    let executor = CrossSchemaExecutor::new(schemas);
    let page = executor.execute(&plan, &backends).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].player_id, high_level);
    assert_eq!(page.items[0].schemas.get("stats").unwrap().get("kills").unwrap(), &serde_json::json!(10));
}

