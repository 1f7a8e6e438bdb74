//! Schema cardinality/size statistics feeding the optimizer's cost model
//! (§4.G3 step 4). A concurrent TTL cache; unrecorded or expired entries
//! fall back to an unknown-source heuristic keyed by backend category.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use protocol::Clock;

/// Which kind of backend a schema's statistics describe, used only to pick
/// an unknown-source heuristic default (§4.G3 step 4: "SQL {10 000, 500},
/// document {50 000, 1000}, JSON {5 000, 800}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCategory {
    Sql,
    Document,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemaStats {
    pub cardinality: u64,
    pub avg_record_size: u64,
}

impl SchemaStats {
    fn heuristic_default(category: BackendCategory) -> Self {
        match category {
            BackendCategory::Sql => SchemaStats {
                cardinality: 10_000,
                avg_record_size: 500,
            },
            BackendCategory::Document => SchemaStats {
                cardinality: 50_000,
                avg_record_size: 1_000,
            },
            BackendCategory::Json => SchemaStats {
                cardinality: 5_000,
                avg_record_size: 800,
            },
        }
    }
}

struct CachedStats {
    stats: SchemaStats,
    recorded_at: i64,
}

/// A schema-stats cache with a configurable TTL (§4.G3 step 4: "Statistics
/// come from a schema-stats cache (TTL configurable)"). Entries are
/// computed lazily and never mutated in place, only replaced, matching §5's
/// rule for schema/dialect caches.
pub struct SchemaStatsCache {
    entries: DashMap<String, CachedStats>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SchemaStatsCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        SchemaStatsCache {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn record(&self, schema_key: impl Into<String>, stats: SchemaStats) {
        self.entries.insert(
            schema_key.into(),
            CachedStats {
                stats,
                recorded_at: self.clock.now_millis(),
            },
        );
    }

    /// Returns recorded statistics for `schema_key` if present and still
    /// within `ttl`, otherwise `category`'s heuristic default.
    pub fn get_or_default(&self, schema_key: &str, category: BackendCategory) -> SchemaStats {
        if let Some(entry) = self.entries.get(schema_key) {
            let age_ms = self.clock.now_millis() - entry.recorded_at;
            if age_ms >= 0 && age_ms < self.ttl.as_millis() as i64 {
                return entry.stats;
            }
        }
        SchemaStats::heuristic_default(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::FixedClock;

    #[test]
    fn falls_back_to_heuristic_default_when_unrecorded() {
        let cache = SchemaStatsCache::new(Duration::from_secs(60), Arc::new(FixedClock::new(0)));
        let stats = cache.get_or_default("profiles", BackendCategory::Sql);
        assert_eq!(stats.cardinality, 10_000);
        assert_eq!(stats.avg_record_size, 500);
    }

    #[test]
    fn recorded_stats_expire_after_ttl() {
        let clock = FixedClock::new(0);
        let cache = SchemaStatsCache::new(Duration::from_secs(60), Arc::new(clock.clone()));
        cache.record(
            "profiles",
            SchemaStats {
                cardinality: 42,
                avg_record_size: 99,
            },
        );
        assert_eq!(cache.get_or_default("profiles", BackendCategory::Sql).cardinality, 42);
        clock.set(61_000);
        assert_eq!(cache.get_or_default("profiles", BackendCategory::Sql).cardinality, 10_000);
    }
}
