//! Cross-schema query planning + execution (§4.G3).

pub mod builder;
pub mod executor;
pub mod optimizer;
pub mod stats;

pub use builder::{CrossSchemaQuery, CrossSchemaQueryBuilder, JoinSpec, JoinType};
pub use executor::{CrossSchemaExecutor, CrossSchemaResult};
pub use optimizer::{OptimizerConfig, PlannedJoin, QueryOptimizer, QueryPlan};
pub use stats::{BackendCategory, SchemaStats, SchemaStatsCache};
