//! `CrossSchemaQueryBuilder` (§4.G3): the query description the optimizer
//! compiles into a plan. Follows the same builder-then-build shape as
//! [`crate::schema::SchemaBuilder`].

use crate::filter::{Filter, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// The base selectivity for this join type before any of its filters are
    /// applied (§4.G3 step 3).
    pub fn base_selectivity(self) -> f64 {
        match self {
            JoinType::Inner => 0.5,
            JoinType::Left | JoinType::Right => 0.8,
            JoinType::Full => 1.0,
        }
    }

    pub fn sql_keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub target_schema: String,
    pub join_type: JoinType,
    pub filters: Vec<Filter>,
}

/// One cross-schema query: a root schema, its joins, filters on the root,
/// sort orders, and an optional limit/offset (§4.G3).
#[derive(Debug, Clone)]
pub struct CrossSchemaQuery {
    pub root_schema: String,
    pub root_filters: Vec<Filter>,
    pub joins: Vec<JoinSpec>,
    pub sort_orders: Vec<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub struct CrossSchemaQueryBuilder {
    root_schema: String,
    root_filters: Vec<Filter>,
    joins: Vec<JoinSpec>,
    sort_orders: Vec<SortOrder>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl CrossSchemaQueryBuilder {
    pub fn new(root_schema: impl Into<String>) -> Self {
        CrossSchemaQueryBuilder {
            root_schema: root_schema.into(),
            root_filters: Vec::new(),
            joins: Vec::new(),
            sort_orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.root_filters.push(filter);
        self
    }

    pub fn join(mut self, target_schema: impl Into<String>, join_type: JoinType, filters: Vec<Filter>) -> Self {
        self.joins.push(JoinSpec {
            target_schema: target_schema.into(),
            join_type,
            filters,
        });
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort_orders.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> CrossSchemaQuery {
        CrossSchemaQuery {
            root_schema: self.root_schema,
            root_filters: self.root_filters,
            joins: self.joins,
            sort_orders: self.sort_orders,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
