//! `SqlDialect` (§4.G1, §6): type mapping, identifier quoting, and upsert
//! construction for Postgres and SQLite. Concrete SQL dialects beyond this
//! interface are out of scope per §1, but the interface itself — plus the
//! two dialects the end-to-end scenarios in §8 exercise — belongs here.

use crate::schema::{FieldType, SchemaDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Postgres,
    Sqlite,
}

pub trait SqlDialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Quotes an identifier, doubling any embedded quote character.
    fn quote_identifier(&self, ident: &str) -> String;

    /// The bind-parameter placeholder for the `index`-th (1-based) bound
    /// value in a statement.
    fn placeholder(&self, index: usize) -> String;

    /// Whether this dialect can evaluate `LIKE`/prefix/suffix string
    /// predicates natively (§4.G3 step 2).
    fn supports_string_operators(&self) -> bool {
        true
    }

    fn column_type(&self, field_type: FieldType) -> &'static str;

    /// `CREATE TABLE IF NOT EXISTS` DDL for a schema's table.
    fn create_table_sql(&self, schema: &SchemaDescriptor) -> String {
        let columns = schema
            .fields
            .iter()
            .map(|field| {
                let suffix = if field.name == schema.primary_key_field {
                    " PRIMARY KEY"
                } else {
                    ""
                };
                format!(
                    "{} {}{}",
                    self.quote_identifier(&field.column),
                    self.column_type(field.field_type),
                    suffix
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(&schema.table),
            columns
        )
    }

    /// `CREATE INDEX IF NOT EXISTS`, respecting per-column ASC/DESC (§6).
    fn create_index_sql(&self, schema: &SchemaDescriptor, index_name: &str, columns: &[(String, bool)]) -> String {
        let column_list = columns
            .iter()
            .map(|(column, ascending)| {
                format!(
                    "{} {}",
                    self.quote_identifier(column),
                    if *ascending { "ASC" } else { "DESC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.quote_identifier(index_name),
            self.quote_identifier(&schema.table),
            column_list
        )
    }

    /// The `INSERT … ON CONFLICT …` (Postgres) or `INSERT OR REPLACE …`
    /// (SQLite) upsert statement for a full-row save (§4.G1).
    fn upsert_sql(&self, schema: &SchemaDescriptor) -> String;
}

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Text => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::BigInt => "BIGINT",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::Bool => "BOOLEAN",
            FieldType::Uuid => "UUID",
            FieldType::Timestamp => "TIMESTAMPTZ",
            FieldType::Json => "TEXT",
        }
    }

    fn upsert_sql(&self, schema: &SchemaDescriptor) -> String {
        let columns = schema
            .fields
            .iter()
            .map(|field| self.quote_identifier(&field.column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=schema.fields.len())
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>()
            .join(", ");
        let update_set = schema
            .fields
            .iter()
            .filter(|field| field.name != schema.primary_key_field)
            .map(|field| {
                let column = self.quote_identifier(&field.column);
                format!("{column} = EXCLUDED.{column}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let pk_column = self.quote_identifier(schema.primary_key_column());
        format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) ON CONFLICT ({pk_column}) DO UPDATE SET {update_set}",
            table = self.quote_identifier(&schema.table),
        )
    }
}

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Text => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::BigInt => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::Bool => "INTEGER",
            FieldType::Uuid => "TEXT",
            FieldType::Timestamp => "TEXT",
            FieldType::Json => "TEXT",
        }
    }

    fn upsert_sql(&self, schema: &SchemaDescriptor) -> String {
        let columns = schema
            .fields
            .iter()
            .map(|field| self.quote_identifier(&field.column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; schema.fields.len()].join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.quote_identifier(&schema.table),
            columns,
            placeholders
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, FieldType};

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::builder("profiles")
            .field(FieldDescriptor::new("level", "level", FieldType::Integer))
            .field(FieldDescriptor::new("name", "name", FieldType::Text))
            .build()
    }

    #[test]
    fn postgres_upsert_uses_on_conflict_excluded() {
        let sql = PostgresDialect.upsert_sql(&schema());
        assert!(sql.starts_with("INSERT INTO \"profiles\""));
        assert!(sql.contains("ON CONFLICT (\"uuid\") DO UPDATE SET"));
        assert!(sql.contains("\"level\" = EXCLUDED.\"level\""));
    }

    #[test]
    fn sqlite_upsert_uses_insert_or_replace() {
        let sql = SqliteDialect.upsert_sql(&schema());
        assert!(sql.starts_with("INSERT OR REPLACE INTO `profiles`"));
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn postgres_quoting_doubles_embedded_quote() {
        assert_eq!(PostgresDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn sqlite_quoting_doubles_embedded_backtick() {
        assert_eq!(SqliteDialect.quote_identifier("a`b"), "`a``b`");
    }
}
