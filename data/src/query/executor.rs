//! Cross-schema execution (§4.G3): one native SQL `JOIN` when every
//! referenced schema's backend is a [`SqlBackend`] sharing the same
//! connection, otherwise an application-level UUID-intersection fallback
//! that loads each schema's rows through its own `query()` and combines
//! them in process.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::dirty::BackendRegistry;
use crate::error::{DataError, DataResult};
use crate::filter::{Filter, NullHandling, SortDirection, SortOrder};
use crate::page::{Page, Pagination};
use crate::query::builder::JoinType;
use crate::query::optimizer::QueryPlan;
use crate::schema::{FieldType, PlayerData, SchemaDescriptor, SchemaRegistry};
use crate::sql::backend::{bind_value, build_where_clause, SqlBackend};
use crate::sql::dialect::SqlDialect;

/// One joined record: the shared player id plus each referenced schema's
/// data bag, keyed by schema key. A join side absent in a `LEFT`/`FULL`
/// result simply has no entry for that schema key.
#[derive(Debug, Clone)]
pub struct CrossSchemaResult {
    pub player_id: Uuid,
    pub schemas: HashMap<String, PlayerData>,
}

pub struct CrossSchemaExecutor {
    schemas: Arc<SchemaRegistry>,
}

impl CrossSchemaExecutor {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        CrossSchemaExecutor { schemas }
    }

    pub async fn execute(&self, plan: &QueryPlan, backends: &BackendRegistry) -> DataResult<Page<CrossSchemaResult>> {
        let root_backend = backends
            .get(&plan.root_schema)
            .ok_or_else(|| DataError::UnknownSchema(plan.root_schema.clone()))?;

        if let Some(root_sql) = root_backend.as_any().downcast_ref::<SqlBackend>() {
            if self.joins_share_connection(plan, backends, root_sql)? {
                let (sql, binds) = build_native_sql(root_sql.dialect().as_ref(), &self.schemas, plan)?;
                return self.execute_native(plan, root_sql, &sql, &binds).await;
            }
            tracing::warn!(root_schema = %plan.root_schema, "cross-schema query could not be translated to native SQL, falling back to in-memory join");
        }

        self.execute_fallback(plan, backends).await
    }

    fn joins_share_connection(&self, plan: &QueryPlan, backends: &BackendRegistry, root_sql: &SqlBackend) -> DataResult<bool> {
        for join in &plan.joins {
            let backend = backends
                .get(&join.target_schema)
                .ok_or_else(|| DataError::UnknownSchema(join.target_schema.clone()))?;
            let Some(join_sql) = backend.as_any().downcast_ref::<SqlBackend>() else {
                return Ok(false);
            };
            if !join_sql.shares_connection_with(root_sql) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn execute_native(
        &self,
        plan: &QueryPlan,
        root_sql: &SqlBackend,
        sql: &str,
        binds: &[(FieldType, serde_json::Value)],
    ) -> DataResult<Page<CrossSchemaResult>> {
        let mut query = sqlx::query(sql);
        for (field_type, value) in binds {
            query = bind_value(query, *field_type, value);
        }
        let rows = query.fetch_all(root_sql.pool()).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(self.row_to_result(row, plan)?);
        }

        // SQL pushed down only the pushdown-eligible filters; custom
        // predicates and backend-unsupported string operators (if any
        // survived as "remainder") are evaluated here. In the common case
        // (§8 scenario 5) every filter is pushdown-eligible and this is a
        // no-op.
        results.retain(|result| passes_remainder(result, plan));

        paginate(results, plan)
    }

    /// Streams native-join rows as they arrive instead of buffering the
    /// whole result set, for the "forward-only cursor + fetch-size" path
    /// (§4.G3). The caller is responsible for keeping `sql`/`binds` alive
    /// for the stream's lifetime.
    pub fn stream_native<'e>(
        &'e self,
        plan: &'e QueryPlan,
        root_sql: &'e SqlBackend,
        sql: &'e str,
        binds: &'e [(FieldType, serde_json::Value)],
    ) -> impl futures_util::Stream<Item = DataResult<CrossSchemaResult>> + 'e {
        let mut query = sqlx::query(sql);
        for (field_type, value) in binds {
            query = bind_value(query, *field_type, value);
        }
        query.fetch(root_sql.pool()).map(move |row| {
            let row = row.map_err(DataError::Sql)?;
            self.row_to_result(&row, plan)
        })
    }

    fn row_to_result(&self, row: &AnyRow, plan: &QueryPlan) -> DataResult<CrossSchemaResult> {
        let root_schema = self.schemas.get(&plan.root_schema)?;
        let root_data = row_to_aliased_data(row, "t0", root_schema)?
            .ok_or_else(|| DataError::UnknownSchema(format!("{} row missing its primary key column", root_schema.key)))?;
        let player_id = extract_player_id(root_schema, &root_data)?;

        let mut schemas_data = HashMap::new();
        schemas_data.insert(plan.root_schema.clone(), root_data);
        for (index, join) in plan.joins.iter().enumerate() {
            let alias = format!("t{}", index + 1);
            let schema = self.schemas.get(&join.target_schema)?;
            if let Some(data) = row_to_aliased_data(row, &alias, schema)? {
                schemas_data.insert(join.target_schema.clone(), data);
            }
        }
        Ok(CrossSchemaResult {
            player_id,
            schemas: schemas_data,
        })
    }

    /// §4.G3: "In-memory fallback… load all rows, evaluate every filter's
    /// predicate in process, then paginate." Also the path for mixed
    /// backends (one schema's backend is not a shared-connection SQL
    /// backend).
    async fn execute_fallback(&self, plan: &QueryPlan, backends: &BackendRegistry) -> DataResult<Page<CrossSchemaResult>> {
        let root_backend = backends
            .get(&plan.root_schema)
            .ok_or_else(|| DataError::UnknownSchema(plan.root_schema.clone()))?;
        let root_filters: Vec<&Filter> = plan
            .root_pushdown_filters
            .iter()
            .chain(plan.root_remainder_filters.iter())
            .collect();
        let root_page = root_backend.query(&plan.root_schema, &[], Pagination::default()).await?;

        let mut results: HashMap<Uuid, CrossSchemaResult> = HashMap::new();
        for record in root_page.items {
            if root_filters.iter().all(|filter| filter.matches(&record.data)) {
                let mut schemas_data = HashMap::new();
                schemas_data.insert(plan.root_schema.clone(), record.data);
                results.insert(
                    record.player_id,
                    CrossSchemaResult {
                        player_id: record.player_id,
                        schemas: schemas_data,
                    },
                );
            }
        }

        for join in &plan.joins {
            let join_backend = backends
                .get(&join.target_schema)
                .ok_or_else(|| DataError::UnknownSchema(join.target_schema.clone()))?;
            let join_filters: Vec<&Filter> = join.pushdown_filters.iter().chain(join.remainder_filters.iter()).collect();
            let join_page = join_backend.query(&join.target_schema, &[], Pagination::default()).await?;

            let mut join_data: HashMap<Uuid, PlayerData> = HashMap::new();
            for record in join_page.items {
                if join_filters.iter().all(|filter| filter.matches(&record.data)) {
                    join_data.insert(record.player_id, record.data);
                }
            }

            apply_join(&mut results, join, join_data);
        }

        let mut items: Vec<CrossSchemaResult> = results.into_values().collect();
        sort_results(&mut items, &plan.sort_orders);
        paginate(items, plan)
    }
}

fn apply_join(results: &mut HashMap<Uuid, CrossSchemaResult>, join: &crate::query::optimizer::PlannedJoin, join_data: HashMap<Uuid, PlayerData>) {
    match join.join_type {
        JoinType::Inner => {
            results.retain(|player_id, _| join_data.contains_key(player_id));
            for (player_id, result) in results.iter_mut() {
                if let Some(data) = join_data.get(player_id) {
                    result.schemas.insert(join.target_schema.clone(), data.clone());
                }
            }
        }
        JoinType::Left => {
            for (player_id, result) in results.iter_mut() {
                if let Some(data) = join_data.get(player_id) {
                    result.schemas.insert(join.target_schema.clone(), data.clone());
                }
            }
        }
        JoinType::Right => {
            for (player_id, data) in &join_data {
                let entry = results.entry(*player_id).or_insert_with(|| CrossSchemaResult {
                    player_id: *player_id,
                    schemas: HashMap::new(),
                });
                entry.schemas.insert(join.target_schema.clone(), data.clone());
            }
            results.retain(|player_id, _| join_data.contains_key(player_id));
        }
        JoinType::Full => {
            for (player_id, data) in &join_data {
                let entry = results.entry(*player_id).or_insert_with(|| CrossSchemaResult {
                    player_id: *player_id,
                    schemas: HashMap::new(),
                });
                entry.schemas.insert(join.target_schema.clone(), data.clone());
            }
        }
    }
}

fn passes_remainder(result: &CrossSchemaResult, plan: &QueryPlan) -> bool {
    if let Some(root_data) = result.schemas.get(&plan.root_schema) {
        if !plan.root_remainder_filters.iter().all(|filter| filter.matches(root_data)) {
            return false;
        }
    }
    for join in &plan.joins {
        match result.schemas.get(&join.target_schema) {
            Some(data) => {
                if !join.remainder_filters.iter().all(|filter| filter.matches(data)) {
                    return false;
                }
            }
            None if !join.remainder_filters.is_empty() => return false,
            None => {}
        }
    }
    true
}

fn paginate(mut items: Vec<CrossSchemaResult>, plan: &QueryPlan) -> DataResult<Page<CrossSchemaResult>> {
    let total = items.len() as u64;
    let offset = plan.offset.unwrap_or(0);
    let limit = plan.limit.unwrap_or(0);
    let take = if limit == 0 { usize::MAX } else { limit };
    if offset < items.len() {
        items = items.split_off(offset);
    } else {
        items.clear();
    }
    items.truncate(take);
    Ok(Page {
        items,
        total,
        offset,
        limit,
    })
}

fn sort_results(items: &mut [CrossSchemaResult], sort_orders: &[SortOrder]) {
    if sort_orders.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        for sort in sort_orders {
            let ordering = compare_sort_field(a, b, sort);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_sort_field(a: &CrossSchemaResult, b: &CrossSchemaResult, sort: &SortOrder) -> Ordering {
    let a_value = a.schemas.get(&sort.schema).and_then(|data| data.get(&sort.field)).and_then(serde_json::Value::as_f64);
    let b_value = b.schemas.get(&sort.schema).and_then(|data| data.get(&sort.field)).and_then(serde_json::Value::as_f64);
    match (a_value, b_value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => compare_with_nulls(true, false, sort.nulls),
        (Some(_), None) => compare_with_nulls(false, true, sort.nulls),
        (Some(x), Some(y)) => {
            let cmp = x.total_cmp(&y);
            match sort.direction {
                SortDirection::Ascending => cmp,
                SortDirection::Descending => cmp.reverse(),
            }
        }
    }
}

/// `NULLS FIRST`/`NULLS LAST` placement is independent of ascending vs.
/// descending (§8: `ORDER BY stats.kills DESC NULLS LAST` keeps nulls at
/// the end even though the non-null values sort descending). `Default`
/// treats nulls as sorting last, matching Postgres's default for `ASC`.
fn compare_with_nulls(a_is_null: bool, b_is_null: bool, nulls: NullHandling) -> Ordering {
    let nulls_first = matches!(nulls, NullHandling::NullsFirst);
    match (a_is_null, b_is_null) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => unreachable!("compare_with_nulls called with neither side null"),
    }
}

fn extract_player_id(schema: &SchemaDescriptor, data: &PlayerData) -> DataResult<Uuid> {
    data.get(&schema.primary_key_field)
        .and_then(|value| value.as_str())
        .and_then(|text| Uuid::parse_str(text).ok())
        .ok_or_else(|| DataError::UnknownSchema(format!("{} row missing a valid primary key", schema.key)))
}

fn row_to_aliased_data(row: &AnyRow, alias: &str, schema: &SchemaDescriptor) -> DataResult<Option<PlayerData>> {
    let pk_column = format!("{alias}_{}", schema.primary_key_column());
    if row.try_get::<String, _>(pk_column.as_str()).is_err() {
        return Ok(None);
    }

    let mut data = PlayerData::new();
    for field in &schema.fields {
        let column = format!("{alias}_{}", field.column);
        let value = match field.field_type {
            FieldType::Integer => row.try_get::<i32, _>(column.as_str()).ok().map(|raw| serde_json::json!(raw)),
            FieldType::BigInt => row.try_get::<i64, _>(column.as_str()).ok().map(|raw| serde_json::json!(raw)),
            FieldType::Float => row.try_get::<f64, _>(column.as_str()).ok().map(|raw| serde_json::json!(raw)),
            FieldType::Bool => row.try_get::<bool, _>(column.as_str()).ok().map(|raw| serde_json::json!(raw)),
            FieldType::Json => row
                .try_get::<String, _>(column.as_str())
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            FieldType::Text | FieldType::Uuid | FieldType::Timestamp => {
                row.try_get::<String, _>(column.as_str()).ok().map(|raw| serde_json::json!(raw))
            }
        };
        data.insert(field.name.clone(), value.unwrap_or(serde_json::Value::Null));
    }
    Ok(Some(data))
}

/// Builds the single `SELECT … JOIN … WHERE … ORDER BY … LIMIT/OFFSET`
/// statement for an all-SQL, same-connection plan (§4.G3, §8 scenario 5):
/// aliased columns `t<i>_<col>`, aliased joins whose `ON` clause compares
/// each schema's primary key, pushdown filters bound as parameters.
fn build_native_sql(
    dialect: &dyn SqlDialect,
    schemas: &SchemaRegistry,
    plan: &QueryPlan,
) -> DataResult<(String, Vec<(FieldType, serde_json::Value)>)> {
    let root_schema = schemas.get(&plan.root_schema)?;
    let mut join_schemas = Vec::with_capacity(plan.joins.len());
    for join in &plan.joins {
        join_schemas.push(schemas.get(&join.target_schema)?);
    }

    let mut select_columns = Vec::new();
    for field in &root_schema.fields {
        select_columns.push(format!(
            "t0.{} AS t0_{}",
            dialect.quote_identifier(&field.column),
            field.column
        ));
    }
    for (index, schema) in join_schemas.iter().enumerate() {
        let alias = format!("t{}", index + 1);
        for field in &schema.fields {
            select_columns.push(format!(
                "{alias}.{} AS {alias}_{}",
                dialect.quote_identifier(&field.column),
                field.column
            ));
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {} t0",
        select_columns.join(", "),
        dialect.quote_identifier(&root_schema.table)
    );

    for (index, (join, schema)) in plan.joins.iter().zip(join_schemas.iter()).enumerate() {
        let alias = format!("t{}", index + 1);
        sql.push_str(&format!(
            " {} {} {alias} ON t0.{} = {alias}.{}",
            join.join_type.sql_keyword(),
            dialect.quote_identifier(&schema.table),
            dialect.quote_identifier(root_schema.primary_key_column()),
            dialect.quote_identifier(schema.primary_key_column()),
        ));
    }

    let mut placeholder_index = 1;
    let mut where_clauses = Vec::new();
    let mut binds = Vec::new();

    let root_filter_refs: Vec<&Filter> = plan.root_pushdown_filters.iter().collect();
    let (clauses, root_binds) = build_where_clause(dialect, root_schema, &root_filter_refs, &mut placeholder_index, Some("t0"))?;
    where_clauses.extend(clauses);
    binds.extend(root_binds);

    for (index, (join, schema)) in plan.joins.iter().zip(join_schemas.iter()).enumerate() {
        let alias = format!("t{}", index + 1);
        let filter_refs: Vec<&Filter> = join.pushdown_filters.iter().collect();
        let (clauses, join_binds) = build_where_clause(dialect, schema, &filter_refs, &mut placeholder_index, Some(&alias))?;
        where_clauses.extend(clauses);
        binds.extend(join_binds);
    }

    if !where_clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clauses.join(" AND "));
    }

    if !plan.sort_orders.is_empty() {
        let mut order_parts = Vec::new();
        for sort in &plan.sort_orders {
            let alias = if sort.schema == plan.root_schema {
                "t0".to_string()
            } else {
                let index = plan
                    .joins
                    .iter()
                    .position(|join| join.target_schema == sort.schema)
                    .ok_or_else(|| DataError::UnknownSchema(sort.schema.clone()))?;
                format!("t{}", index + 1)
            };
            let schema = schemas.get(&sort.schema)?;
            let column = schema.field(&sort.field).map(|field| field.column.as_str()).unwrap_or(sort.field.as_str());
            let direction = match sort.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            let nulls = match sort.nulls {
                NullHandling::Default => "",
                NullHandling::NullsFirst => " NULLS FIRST",
                NullHandling::NullsLast => " NULLS LAST",
            };
            order_parts.push(format!("{alias}.{} {direction}{nulls}", dialect.quote_identifier(column)));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_parts.join(", "));
    }

    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = plan.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    Ok((sql, binds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOperator;
    use crate::query::builder::CrossSchemaQueryBuilder;
    use crate::query::optimizer::{OptimizerConfig, QueryOptimizer};
    use crate::query::stats::SchemaStatsCache;
    use crate::schema::{FieldDescriptor, FieldType, SchemaDescriptor};
    use crate::sql::dialect::PostgresDialect;
    use protocol::{Clock, FixedClock};
    use std::time::Duration;

    fn schemas() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry.register(
            SchemaDescriptor::builder("profiles")
                .field(FieldDescriptor::new("level", "level", FieldType::Integer))
                .build(),
        );
        registry.register(
            SchemaDescriptor::builder("stats")
                .field(FieldDescriptor::new("kills", "kills", FieldType::Integer))
                .build(),
        );
        Arc::new(registry)
    }

    fn plan_for_scenario_five(schemas: Arc<SchemaRegistry>) -> QueryPlan {
        let query = CrossSchemaQueryBuilder::new("profiles")
            .filter(Filter::structured("level", FilterOperator::GreaterThan, 10))
            .join("stats", JoinType::Left, vec![])
            .sort(SortOrder::new("stats", "kills", SortDirection::Descending).with_nulls(NullHandling::NullsLast))
            .limit(50)
            .build();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        let stats = Arc::new(SchemaStatsCache::new(Duration::from_secs(60), clock.clone()));
        let backends = BackendRegistry::new();
        // The optimizer only needs backend presence + capability flags, not
        // real connections, to classify pushdown and compute a plan.
        struct NoopBackend;
        #[async_trait::async_trait]
        impl crate::backend::PlayerDataBackend for NoopBackend {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            async fn load(&self, _p: Uuid, _s: &str) -> DataResult<Option<PlayerData>> {
                Ok(None)
            }
            async fn save(&self, _p: Uuid, _s: &str, _d: &PlayerData) -> DataResult<()> {
                Ok(())
            }
            async fn save_batch(&self, _b: &HashMap<Uuid, HashMap<String, PlayerData>>) -> DataResult<usize> {
                Ok(0)
            }
            async fn query(&self, _s: &str, _f: &[Filter], _p: Pagination) -> DataResult<Page<crate::backend::PlayerRecord>> {
                Ok(Page {
                    items: Vec::new(),
                    total: 0,
                    offset: 0,
                    limit: 0,
                })
            }
            fn supports_native_queries(&self) -> bool {
                false
            }
        }
        backends.register("profiles", Arc::new(NoopBackend));
        backends.register("stats", Arc::new(NoopBackend));
        let optimizer = QueryOptimizer::new(schemas, stats, clock, OptimizerConfig::default());
        optimizer.optimize(query, &backends).unwrap()
    }

    #[test]
    fn native_sql_matches_scenario_five_shape() {
        let schemas = schemas();
        let plan = plan_for_scenario_five(schemas.clone());
        let (sql, binds) = build_native_sql(&PostgresDialect, &schemas, &plan).unwrap();

        assert!(sql.contains("LEFT JOIN \"stats\" t1 ON t0.\"uuid\" = t1.\"uuid\""));
        assert!(sql.contains("WHERE t0.\"level\" > $1"));
        assert!(sql.contains("ORDER BY t1.\"kills\" DESC NULLS LAST"));
        assert!(sql.ends_with("LIMIT 50"));
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn sort_with_nulls_last_keeps_nulls_at_the_end_descending() {
        let schema_key = "stats".to_string();
        let mut with_value = HashMap::new();
        let mut data = PlayerData::new();
        data.insert("kills".to_string(), serde_json::json!(5));
        with_value.insert(schema_key.clone(), data);

        let without_value = HashMap::new();

        let mut items = vec![
            CrossSchemaResult {
                player_id: Uuid::new_v4(),
                schemas: without_value,
            },
            CrossSchemaResult {
                player_id: Uuid::new_v4(),
                schemas: with_value,
            },
        ];
        let sort = vec![SortOrder::new("stats", "kills", SortDirection::Descending).with_nulls(NullHandling::NullsLast)];
        sort_results(&mut items, &sort);

        assert!(items[0].schemas.contains_key("stats"));
        assert!(!items[1].schemas.contains_key("stats"));
    }
}
