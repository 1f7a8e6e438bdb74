//! Error taxonomy for the data layer (§7): I/O and SQL failures fail the
//! individual operation and are logged with enough context to diagnose
//! (playerId, schemaKey); nothing here catches and silently discards.

use thiserror::Error;

pub type DataResult<T> = Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no schema registered under key {0:?}")]
    UnknownSchema(String),

    #[error("sql backend error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("document store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cross-schema query could not be translated to native SQL: {0}")]
    NoNativeTranslation(String),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
}
