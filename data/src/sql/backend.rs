//! The SQL backend (§4.G1): `save` runs with autocommit (a single
//! statement, no open transaction); `saveBatch` opens one transaction for
//! the whole batch and rolls back to an empty result on any failure.
//! Built on `sqlx`'s `Any` driver so one backend type serves both dialects
//! named in §6 — the dialect only changes identifier quoting, column
//! types, and upsert SQL, never the driver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPool, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row};
use uuid::Uuid;

use crate::backend::{PlayerDataBackend, PlayerRecord};
use crate::error::{DataError, DataResult};
use crate::filter::{Filter, FilterOperator};
use crate::page::{Page, Pagination};
use crate::schema::{FieldType, PlayerData, SchemaDescriptor, SchemaRegistry};
use crate::sql::dialect::SqlDialect;

pub struct SqlBackend {
    pool: AnyPool,
    /// Identifies which logical connection/pool this backend was built
    /// from. The wiring layer assigns the same id to every `SqlBackend` it
    /// constructs from one shared `AnyPool`, so [`SqlBackend::shares_connection_with`]
    /// doesn't need to inspect `sqlx` internals to answer "same connection?"
    /// (§4.G3: "every referenced schema's backend is an SQL backend sharing
    /// the same connection").
    connection_id: String,
    dialect: Arc<dyn SqlDialect>,
    schemas: Arc<SchemaRegistry>,
}

impl SqlBackend {
    pub fn new(pool: AnyPool, connection_id: impl Into<String>, dialect: Arc<dyn SqlDialect>, schemas: Arc<SchemaRegistry>) -> Self {
        SqlBackend {
            pool,
            connection_id: connection_id.into(),
            dialect,
            schemas,
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Whether `other` shares this backend's connection pool, the
    /// condition under which the cross-schema executor may build a single
    /// native `JOIN` (§4.G3).
    pub fn shares_connection_with(&self, other: &SqlBackend) -> bool {
        self.connection_id == other.connection_id
    }

    /// Runs `CREATE TABLE IF NOT EXISTS` for every registered schema. Not
    /// part of `PlayerDataBackend` — invoked once by the wiring layer at
    /// startup, the way a migration step would be.
    pub async fn migrate(&self) -> DataResult<()> {
        for key in self.schemas.keys().collect::<Vec<_>>() {
            let schema = self.schemas.get(key)?;
            sqlx::query(&self.dialect.create_table_sql(schema))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    fn extract_player_id(&self, schema: &SchemaDescriptor, data: &PlayerData) -> DataResult<Uuid> {
        data.get(&schema.primary_key_field)
            .and_then(|value| value.as_str())
            .and_then(|text| Uuid::parse_str(text).ok())
            .ok_or_else(|| DataError::UnknownSchema(format!("{} row missing a valid primary key", schema.key)))
    }

    fn row_to_data(&self, schema: &SchemaDescriptor, row: &AnyRow) -> DataResult<PlayerData> {
        let mut data = PlayerData::new();
        for field in &schema.fields {
            let value = match field.field_type {
                FieldType::Integer => {
                    let raw: i32 = row.try_get(field.column.as_str())?;
                    serde_json::json!(raw)
                }
                FieldType::BigInt => {
                    let raw: i64 = row.try_get(field.column.as_str())?;
                    serde_json::json!(raw)
                }
                FieldType::Float => {
                    let raw: f64 = row.try_get(field.column.as_str())?;
                    serde_json::json!(raw)
                }
                FieldType::Bool => {
                    let raw: bool = row.try_get(field.column.as_str())?;
                    serde_json::json!(raw)
                }
                FieldType::Json => {
                    let raw: String = row.try_get(field.column.as_str())?;
                    serde_json::from_str(&raw)?
                }
                FieldType::Text | FieldType::Uuid | FieldType::Timestamp => {
                    let raw: String = row.try_get(field.column.as_str())?;
                    serde_json::json!(raw)
                }
            };
            data.insert(field.name.clone(), value);
        }
        Ok(data)
    }

    fn upsert_query<'q>(&self, schema: &SchemaDescriptor, player_id: Uuid, data: &'q PlayerData, sql: &'q str) -> Query<'q, Any, AnyArguments<'q>> {
        let mut query = sqlx::query(sql);
        for field in &schema.fields {
            let value = if field.name == schema.primary_key_field {
                serde_json::Value::String(player_id.to_string())
            } else {
                data.get(&field.name).cloned().unwrap_or(serde_json::Value::Null)
            };
            query = bind_value(query, field.field_type, &value);
        }
        query
    }
}

pub(crate) fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    field_type: FieldType,
    value: &serde_json::Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match field_type {
        FieldType::Integer => query.bind(value.as_i64().unwrap_or_default() as i32),
        FieldType::BigInt => query.bind(value.as_i64().unwrap_or_default()),
        FieldType::Float => query.bind(value.as_f64().unwrap_or_default()),
        FieldType::Bool => query.bind(value.as_bool().unwrap_or_default()),
        FieldType::Json => query.bind(serde_json::to_string(value).unwrap_or_default()),
        FieldType::Text | FieldType::Uuid | FieldType::Timestamp => {
            query.bind(value.as_str().map(str::to_string).unwrap_or_default())
        }
    }
}

fn sql_operator(operator: FilterOperator) -> &'static str {
    match operator {
        FilterOperator::Equals => "=",
        FilterOperator::NotEquals => "<>",
        FilterOperator::GreaterThan => ">",
        FilterOperator::GreaterOrEqual => ">=",
        FilterOperator::LessThan => "<",
        FilterOperator::LessOrEqual => "<=",
        FilterOperator::Like | FilterOperator::StartsWith | FilterOperator::EndsWith => "LIKE",
        FilterOperator::In | FilterOperator::IsNull | FilterOperator::IsNotNull => {
            unreachable!("IN/IS NULL/IS NOT NULL are built by their own clause, not sql_operator")
        }
    }
}

fn like_pattern(operator: FilterOperator, value: &serde_json::Value) -> serde_json::Value {
    let text = value.as_str().unwrap_or_default();
    let wrapped = match operator {
        FilterOperator::Like => format!("%{text}%"),
        FilterOperator::StartsWith => format!("{text}%"),
        FilterOperator::EndsWith => format!("%{text}"),
        _ => text.to_string(),
    };
    serde_json::Value::String(wrapped)
}

/// Builds the `WHERE` clause (and bind list) for the pushdown-eligible
/// subset of `filters` against `schema`, using `dialect` for quoting and
/// placeholders starting at `placeholder_index`. `table_alias` prefixes
/// every column reference (`t1.` style) for the cross-schema executor;
/// single-schema callers pass `None`.
pub(crate) fn build_where_clause(
    dialect: &dyn SqlDialect,
    schema: &SchemaDescriptor,
    filters: &[&Filter],
    placeholder_index: &mut usize,
    table_alias: Option<&str>,
) -> DataResult<(Vec<String>, Vec<(FieldType, serde_json::Value)>)> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    for filter in filters {
        let Filter::Structured { field, operator, value } = filter else {
            continue;
        };
        let descriptor_field = schema
            .field(field)
            .ok_or_else(|| DataError::UnknownSchema(format!("{}.{field}", schema.key)))?;
        let column = match table_alias {
            Some(alias) => format!("{alias}.{}", dialect.quote_identifier(&descriptor_field.column)),
            None => dialect.quote_identifier(&descriptor_field.column),
        };
        match operator {
            FilterOperator::IsNull => clauses.push(format!("{column} IS NULL")),
            FilterOperator::IsNotNull => clauses.push(format!("{column} IS NOT NULL")),
            FilterOperator::In => {
                let values = value.as_array().cloned().unwrap_or_default();
                let placeholders = values
                    .iter()
                    .map(|_| {
                        let placeholder = dialect.placeholder(*placeholder_index);
                        *placeholder_index += 1;
                        placeholder
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                clauses.push(format!("{column} IN ({placeholders})"));
                for value in values {
                    binds.push((descriptor_field.field_type, value));
                }
            }
            _ => {
                let placeholder = dialect.placeholder(*placeholder_index);
                *placeholder_index += 1;
                clauses.push(format!("{column} {} {placeholder}", sql_operator(*operator)));
                let bound_value = if operator.is_string_operator() {
                    like_pattern(*operator, value)
                } else {
                    value.clone()
                };
                binds.push((descriptor_field.field_type, bound_value));
            }
        }
    }
    Ok((clauses, binds))
}

#[async_trait]
impl PlayerDataBackend for SqlBackend {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn load(&self, player_id: Uuid, schema: &str) -> DataResult<Option<PlayerData>> {
        let descriptor = self.schemas.get(schema)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            self.dialect.quote_identifier(&descriptor.table),
            self.dialect.quote_identifier(descriptor.primary_key_column()),
            self.dialect.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(player_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.row_to_data(descriptor, &row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, player_id: Uuid, schema: &str, data: &PlayerData) -> DataResult<()> {
        let descriptor = self.schemas.get(schema)?;
        let sql = self.dialect.upsert_sql(descriptor);
        self.upsert_query(descriptor, player_id, data, &sql)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_batch(&self, batch: &HashMap<Uuid, HashMap<String, PlayerData>>) -> DataResult<usize> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(error) => {
                tracing::error!(error = %error, "save_batch could not open a transaction");
                return Ok(0);
            }
        };

        let mut persisted = 0usize;
        for (player_id, schemas) in batch {
            for (schema_key, data) in schemas {
                let descriptor = match self.schemas.get(schema_key) {
                    Ok(descriptor) => descriptor,
                    Err(error) => {
                        tracing::error!(%player_id, schema = schema_key, error = %error, "save_batch aborted: unknown schema");
                        let _ = tx.rollback().await;
                        return Ok(0);
                    }
                };
                let sql = self.dialect.upsert_sql(descriptor);
                let result = self
                    .upsert_query(descriptor, *player_id, data, &sql)
                    .execute(&mut *tx)
                    .await;
                match result {
                    Ok(_) => persisted += 1,
                    Err(error) => {
                        tracing::error!(%player_id, schema = schema_key, error = %error, "save_batch aborted: statement failed");
                        let _ = tx.rollback().await;
                        return Ok(0);
                    }
                }
            }
        }

        if let Err(error) = tx.commit().await {
            tracing::error!(error = %error, "save_batch commit failed");
            return Ok(0);
        }
        Ok(persisted)
    }

    async fn query(&self, schema: &str, filters: &[Filter], pagination: Pagination) -> DataResult<Page<PlayerRecord>> {
        let descriptor = self.schemas.get(schema)?;
        let supports_string = self.dialect.supports_string_operators();
        let (pushdown, remainder): (Vec<&Filter>, Vec<&Filter>) =
            filters.iter().partition(|filter| filter.is_pushdown_eligible(supports_string));

        let mut placeholder_index = 1;
        let (clauses, binds) = build_where_clause(self.dialect.as_ref(), descriptor, &pushdown, &mut placeholder_index, None)?;
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM {}{where_sql}",
            self.dialect.quote_identifier(&descriptor.table)
        );

        let mut query = sqlx::query(&sql);
        for (field_type, value) in &binds {
            query = bind_value(query, *field_type, value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let data = self.row_to_data(descriptor, row)?;
            let player_id = self.extract_player_id(descriptor, &data)?;
            records.push(PlayerRecord { player_id, data });
        }

        if !remainder.is_empty() {
            records.retain(|record| remainder.iter().all(|filter| filter.matches(&record.data)));
        }

        let total = records.len() as u64;
        let limit = if pagination.limit == 0 { usize::MAX } else { pagination.limit };
        let items = records.into_iter().skip(pagination.offset).take(limit).collect();

        Ok(Page {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    fn supports_native_queries(&self) -> bool {
        true
    }

    fn supports_string_operators(&self) -> bool {
        self.dialect.supports_string_operators()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("profiles")
            .field(FieldDescriptor::new("level", "level", FieldType::Integer).indexed())
            .build()
    }

    #[test]
    fn where_clause_builds_equals_with_placeholder() {
        let schema = schema();
        let filter = Filter::eq("level", 10);
        let refs = vec![&filter];
        let mut index = 1;
        let (clauses, binds) = build_where_clause(&PostgresDialectStub, &schema, &refs, &mut index, None).unwrap();
        assert_eq!(clauses, vec!["\"level\" = $1".to_string()]);
        assert_eq!(binds.len(), 1);
    }

    struct PostgresDialectStub;
    impl SqlDialect for PostgresDialectStub {
        fn kind(&self) -> crate::sql::dialect::DialectKind {
            crate::sql::dialect::DialectKind::Postgres
        }
        fn quote_identifier(&self, ident: &str) -> String {
            format!("\"{ident}\"")
        }
        fn placeholder(&self, index: usize) -> String {
            format!("${index}")
        }
        fn column_type(&self, field_type: FieldType) -> &'static str {
            match field_type {
                FieldType::Integer => "INTEGER",
                _ => "TEXT",
            }
        }
        fn upsert_sql(&self, _schema: &SchemaDescriptor) -> String {
            String::new()
        }
    }
}
