pub mod backend;
pub mod dialect;

pub use backend::SqlBackend;
pub use dialect::{DialectKind, PostgresDialect, SqlDialect, SqliteDialect};
