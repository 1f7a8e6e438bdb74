//! `QueryOptimizer.optimize` (§4.G3 steps 1-5): canonical signature + plan
//! cache, filter pushdown classification, join reordering by selectivity,
//! cost estimation, and advisory recommendations.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use protocol::Clock;

use crate::backend::PlayerDataBackend;
use crate::dirty::BackendRegistry;
use crate::error::{DataError, DataResult};
use crate::filter::{Filter, FilterOperator, SortOrder};
use crate::json::JsonDocumentBackend;
use crate::query::builder::{CrossSchemaQuery, JoinType};
use crate::query::stats::{BackendCategory, SchemaStatsCache};
use crate::schema::SchemaRegistry;
use crate::sql::backend::SqlBackend;

/// Plans expire from the cache after this long regardless of
/// `max_cached_plans` (§4.G3 step 1: "plans expire after 5 minutes").
const PLAN_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub plan_cache_enabled: bool,
    pub max_cached_plans: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            plan_cache_enabled: true,
            max_cached_plans: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedJoin {
    pub target_schema: String,
    pub join_type: JoinType,
    pub pushdown_filters: Vec<Filter>,
    pub remainder_filters: Vec<Filter>,
    pub selectivity: f64,
}

/// A compiled, reordered, costed query (§4.G3). Backend-agnostic: whether
/// execution uses a native SQL join or the in-memory fallback is decided
/// separately, by [`crate::query::executor`], once the caller's backends
/// are known.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub root_schema: String,
    pub root_pushdown_filters: Vec<Filter>,
    pub root_remainder_filters: Vec<Filter>,
    /// Reordered ascending by selectivity (most selective first).
    pub joins: Vec<PlannedJoin>,
    pub sort_orders: Vec<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub estimated_cost: f64,
    pub recommendations: Vec<String>,
}

struct CachedPlan {
    plan: QueryPlan,
    created_at: i64,
}

/// Computes and caches [`QueryPlan`]s. One instance lives alongside a
/// [`BackendRegistry`] for the lifetime of the process (§9 "static-singleton
/// managers": recast as an explicit long-lived object, not a global).
pub struct QueryOptimizer {
    schemas: Arc<SchemaRegistry>,
    stats: Arc<SchemaStatsCache>,
    clock: Arc<dyn Clock>,
    config: OptimizerConfig,
    plan_cache: DashMap<String, CachedPlan>,
}

impl QueryOptimizer {
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        stats: Arc<SchemaStatsCache>,
        clock: Arc<dyn Clock>,
        config: OptimizerConfig,
    ) -> Self {
        QueryOptimizer {
            schemas,
            stats,
            clock,
            config,
            plan_cache: DashMap::new(),
        }
    }

    pub fn optimize(&self, query: CrossSchemaQuery, backends: &BackendRegistry) -> DataResult<QueryPlan> {
        let signature = compute_signature(&query);
        if self.config.plan_cache_enabled {
            if let Some(cached) = self.plan_cache.get(&signature) {
                let age_ms = self.clock.now_millis() - cached.created_at;
                if age_ms >= 0 && age_ms < PLAN_TTL.as_millis() as i64 {
                    return Ok(cached.plan.clone());
                }
            }
        }

        let plan = self.build_plan(query, backends)?;

        if self.config.plan_cache_enabled {
            self.insert_plan(signature, plan.clone());
        }

        Ok(plan)
    }

    fn insert_plan(&self, signature: String, plan: QueryPlan) {
        self.plan_cache.insert(
            signature,
            CachedPlan {
                plan,
                created_at: self.clock.now_millis(),
            },
        );
        if self.plan_cache.len() > self.config.max_cached_plans {
            let oldest = self
                .plan_cache
                .iter()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest_key) = oldest {
                self.plan_cache.remove(&oldest_key);
            }
        }
    }

    fn build_plan(&self, query: CrossSchemaQuery, backends: &BackendRegistry) -> DataResult<QueryPlan> {
        let root_backend = backends
            .get(&query.root_schema)
            .ok_or_else(|| DataError::UnknownSchema(query.root_schema.clone()))?;
        let root_category = category_of(root_backend.as_ref());
        let root_stats = self.stats.get_or_default(&query.root_schema, root_category);

        let (root_pushdown_filters, root_remainder_filters): (Vec<Filter>, Vec<Filter>) = query
            .root_filters
            .into_iter()
            .partition(|filter| filter.is_pushdown_eligible(root_backend.supports_string_operators()));

        let mut planned_joins = Vec::with_capacity(query.joins.len());
        let mut join_cost = 0.0_f64;
        for join in query.joins {
            let join_backend = backends
                .get(&join.target_schema)
                .ok_or_else(|| DataError::UnknownSchema(join.target_schema.clone()))?;
            let category = category_of(join_backend.as_ref());
            let stats = self.stats.get_or_default(&join.target_schema, category);

            let (pushdown_filters, remainder_filters): (Vec<Filter>, Vec<Filter>) = join
                .filters
                .into_iter()
                .partition(|filter| filter.is_pushdown_eligible(join_backend.supports_string_operators()));

            let selectivity = join.join_type.base_selectivity()
                * pushdown_filters
                    .iter()
                    .chain(remainder_filters.iter())
                    .map(filter_selectivity)
                    .product::<f64>();

            join_cost += (stats.cardinality as f64 * stats.avg_record_size as f64 / 1000.0) * 1.2;

            planned_joins.push(PlannedJoin {
                target_schema: join.target_schema,
                join_type: join.join_type,
                pushdown_filters,
                remainder_filters,
                selectivity,
            });
        }

        // Join reordering (§4.G3 step 3): most selective (lowest value) first.
        planned_joins.sort_by(|a, b| a.selectivity.total_cmp(&b.selectivity));

        let root_cost = root_stats.cardinality as f64 * root_stats.avg_record_size as f64 / 1000.0;
        let mut estimated_cost = root_cost + join_cost;
        if !query.sort_orders.is_empty() {
            estimated_cost *= 1.1;
        }

        let any_filters = !root_pushdown_filters.is_empty()
            || !root_remainder_filters.is_empty()
            || planned_joins
                .iter()
                .any(|join| !join.pushdown_filters.is_empty() || !join.remainder_filters.is_empty());

        let recommendations = self.recommendations(
            &query.root_schema,
            &root_pushdown_filters,
            &planned_joins,
            root_stats.cardinality,
            query.limit,
            any_filters,
        );

        Ok(QueryPlan {
            root_schema: query.root_schema,
            root_pushdown_filters,
            root_remainder_filters,
            joins: planned_joins,
            sort_orders: query.sort_orders,
            limit: query.limit,
            offset: query.offset,
            estimated_cost,
            recommendations,
        })
    }

    /// §4.G3 step 5: advisory strings, never hard errors.
    fn recommendations(
        &self,
        root_schema: &str,
        root_pushdown: &[Filter],
        joins: &[PlannedJoin],
        root_cardinality: u64,
        limit: Option<usize>,
        any_filters: bool,
    ) -> Vec<String> {
        let mut notes = Vec::new();

        self.recommend_unindexed_equals(root_schema, root_pushdown, &mut notes);
        for join in joins {
            self.recommend_unindexed_equals(&join.target_schema, &join.pushdown_filters, &mut notes);
        }

        if limit.is_none() && root_cardinality > 100_000 {
            notes.push(format!(
                "root schema {root_schema} has cardinality {root_cardinality} (> 100,000) and no limit is set"
            ));
        }
        if joins.len() >= 4 {
            notes.push(format!("query joins {} schemas; consider narrowing the join set", joins.len()));
        }
        if !any_filters {
            notes.push("query has no filters at all; consider adding one to reduce scanned rows".to_string());
        }
        notes
    }

    fn recommend_unindexed_equals(&self, schema_key: &str, filters: &[Filter], notes: &mut Vec<String>) {
        let Ok(schema) = self.schemas.get(schema_key) else {
            return;
        };
        for filter in filters {
            let Filter::Structured { field, operator, .. } = filter else {
                continue;
            };
            if *operator != FilterOperator::Equals {
                continue;
            }
            if let Some(descriptor) = schema.field(field) {
                if !descriptor.indexed {
                    notes.push(format!("{schema_key}.{field} is filtered by EQUALS but is not marked indexed"));
                }
            }
        }
    }
}

fn category_of(backend: &dyn PlayerDataBackend) -> BackendCategory {
    if backend.as_any().downcast_ref::<SqlBackend>().is_some() {
        BackendCategory::Sql
    } else if backend.as_any().downcast_ref::<JsonDocumentBackend>().is_some() {
        BackendCategory::Json
    } else {
        BackendCategory::Document
    }
}

/// The fixed selectivity table from §4.G3 step 3.
fn filter_selectivity(filter: &Filter) -> f64 {
    match filter {
        Filter::Custom { .. } => 0.5,
        Filter::Structured { operator, value, .. } => match operator {
            FilterOperator::Equals => 0.1,
            FilterOperator::NotEquals => 0.9,
            FilterOperator::GreaterThan
            | FilterOperator::GreaterOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessOrEqual => 0.3,
            FilterOperator::In => {
                let count = value.as_array().map(|values| values.len()).unwrap_or(0) as f64;
                (0.1 * count).min(0.5)
            }
            FilterOperator::IsNull => 0.05,
            FilterOperator::IsNotNull => 0.95,
            FilterOperator::Like | FilterOperator::StartsWith | FilterOperator::EndsWith => 0.25,
        },
    }
}

fn operator_ordinal(operator: FilterOperator) -> u8 {
    match operator {
        FilterOperator::Equals => 0,
        FilterOperator::NotEquals => 1,
        FilterOperator::GreaterThan => 2,
        FilterOperator::GreaterOrEqual => 3,
        FilterOperator::LessThan => 4,
        FilterOperator::LessOrEqual => 5,
        FilterOperator::In => 6,
        FilterOperator::IsNull => 7,
        FilterOperator::IsNotNull => 8,
        FilterOperator::Like => 9,
        FilterOperator::StartsWith => 10,
        FilterOperator::EndsWith => 11,
    }
}

/// A canonical string identifying a query's shape for plan-cache lookup
/// (§4.G3 step 1: "root key, join sequence, filter fields + operator
/// ordinals, sort fields + direction, limit/offset").
fn compute_signature(query: &CrossSchemaQuery) -> String {
    let mut signature = String::new();
    signature.push_str("root=");
    signature.push_str(&query.root_schema);

    signature.push_str("|filters=");
    for filter in &query.root_filters {
        signature.push_str(&filter_signature(filter));
        signature.push(',');
    }

    signature.push_str("|joins=");
    for join in &query.joins {
        signature.push_str(&format!("{}:{:?}:[", join.target_schema, join.join_type));
        for filter in &join.filters {
            signature.push_str(&filter_signature(filter));
            signature.push(',');
        }
        signature.push(']');
    }

    signature.push_str("|sort=");
    for sort in &query.sort_orders {
        signature.push_str(&format!("{}.{}:{:?}:{:?},", sort.schema, sort.field, sort.direction, sort.nulls));
    }

    signature.push_str(&format!("|limit={:?}|offset={:?}", query.limit, query.offset));
    signature
}

fn filter_signature(filter: &Filter) -> String {
    match filter {
        Filter::Structured { field, operator, .. } => format!("{field}:{}", operator_ordinal(*operator)),
        Filter::Custom { label, .. } => format!("custom:{label}"),
    }
}
