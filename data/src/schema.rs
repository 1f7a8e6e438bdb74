//! Explicit schema registration: every schema is registered up-front as an
//! explicit list of `(column, type, accessor)` triples, so the SQL
//! executor's row-to-field mapping is just a lookup, never a runtime
//! reflection pass over result columns.

use std::collections::HashMap;

use crate::error::{DataError, DataResult};

/// A player's data for one schema: a flat bag of named fields. Field values
/// are self-describing JSON, matching §1's "SQL and document/JSON" backend
/// split — the SQL backend maps named fields onto typed columns via
/// [`SchemaDescriptor`]; the JSON backend stores the bag verbatim.
pub type PlayerData = serde_json::Map<String, serde_json::Value>;

/// The column type a field maps to in a SQL backend. Drives both DDL
/// (`CREATE TABLE`/index generation) and bind-parameter encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    BigInt,
    Float,
    Bool,
    Uuid,
    Timestamp,
    /// Stored as serialized JSON text; portable across Postgres and SQLite
    /// without relying on a native JSON column type.
    Json,
}

/// One field of a schema: its logical name (the key into [`PlayerData`]),
/// the physical SQL column it is persisted under, and its type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
    /// Whether `EQUALS`/`IN`/range filters on this field should be
    /// recommended for indexing by the query optimizer (§4.G3 step 5).
    pub indexed: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, column: impl Into<String>, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            column: column.into(),
            field_type,
            indexed: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// The schema for one `schemaKey` (§3): table/collection name, primary key
/// field, and the explicit field list that replaces reflection.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub key: String,
    pub table: String,
    pub collection: String,
    pub primary_key_field: String,
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn builder(key: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn primary_key_column(&self) -> &str {
        self.field(&self.primary_key_field)
            .map(|field| field.column.as_str())
            .unwrap_or(self.primary_key_field.as_str())
    }
}

pub struct SchemaBuilder {
    key: String,
    table: Option<String>,
    collection: Option<String>,
    primary_key_field: String,
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        SchemaBuilder {
            table: Some(key.clone()),
            collection: Some(key.clone()),
            key,
            primary_key_field: "uuid".to_string(),
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key_field = field.into();
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> SchemaDescriptor {
        let pk_field = self.primary_key_field.clone();
        let mut fields = self.fields;
        if !fields.iter().any(|field| field.name == pk_field) {
            fields.insert(0, FieldDescriptor::new(pk_field.clone(), pk_field.clone(), FieldType::Uuid));
        }
        SchemaDescriptor {
            table: self.table.unwrap_or_else(|| self.key.clone()),
            collection: self.collection.unwrap_or_else(|| self.key.clone()),
            primary_key_field: pk_field,
            key: self.key,
            fields,
        }
    }
}

/// A registry of schemas, computed lazily at startup and never mutated
/// after insertion (§5: "schema/dialect caches… entries computed lazily and
/// never mutated after insertion").
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry {
            schemas: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: SchemaDescriptor) {
        self.schemas.insert(descriptor.key.clone(), descriptor);
    }

    pub fn get(&self, key: &str) -> DataResult<&SchemaDescriptor> {
        self.schemas
            .get(key)
            .ok_or_else(|| DataError::UnknownSchema(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
