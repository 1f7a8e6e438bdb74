//! The data layer (§4.G): `PlayerDataBackend` plus two concrete backends
//! (SQL via a dialect-generic `sqlx::Any` driver, and a JSON document
//! store), dirty tracking, a persistence scheduler, and a cross-schema
//! query planner + executor.

pub mod backend;
pub mod dirty;
pub mod error;
pub mod filter;
pub mod json;
pub mod page;
pub mod query;
pub mod scheduler;
pub mod schema;
pub mod sql;

pub use backend::{ChangeType, PlayerDataBackend, PlayerRecord};
pub use dirty::{BackendRegistry, DirtyDataManager, DirtyEntry};
pub use error::{DataError, DataResult};
pub use filter::{Filter, FilterOperator, NullHandling, SortDirection, SortOrder};
pub use json::JsonDocumentBackend;
pub use page::{Page, Pagination};
pub use scheduler::{StorageManager, StorageManagerConfig};
pub use schema::{FieldDescriptor, FieldType, PlayerData, SchemaBuilder, SchemaDescriptor, SchemaRegistry};
pub use sql::{DialectKind, PostgresDialect, SqlBackend, SqlDialect, SqliteDialect};
