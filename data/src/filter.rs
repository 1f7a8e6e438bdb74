//! Filter predicates shared between a single-schema `query()` (§4.G1) and
//! the cross-schema query builder (§4.G3).

use serde_json::Value;

/// Operators the query optimizer can reason about for pushdown and
/// selectivity (§4.G3 steps 2-3). `Custom` predicates never push down and
/// are always evaluated in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    In,
    IsNull,
    IsNotNull,
    Like,
    StartsWith,
    EndsWith,
}

impl FilterOperator {
    /// The fixed pushdown set from §4.G3 step 2: comparison/null/`IN`
    /// operators push down on any backend; string operators only push down
    /// on backends that advertise string-operator support.
    pub fn is_unconditionally_pushdownable(self) -> bool {
        matches!(
            self,
            FilterOperator::Equals
                | FilterOperator::NotEquals
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessOrEqual
                | FilterOperator::In
                | FilterOperator::IsNull
                | FilterOperator::IsNotNull
        )
    }

    pub fn is_string_operator(self) -> bool {
        matches!(
            self,
            FilterOperator::Like | FilterOperator::StartsWith | FilterOperator::EndsWith
        )
    }
}

/// One predicate, either a structured operator/field/value triple or an
/// opaque in-process predicate that can never be pushed down.
#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub enum Filter {
    Structured {
        field: String,
        operator: FilterOperator,
        value: Value,
    },
    /// A custom predicate evaluated against a loaded record's data. Carries
    /// a label for logging/recommendations since the closure itself isn't
    /// introspectable.
    Custom {
        label: String,
        predicate: std::sync::Arc<dyn Fn(&serde_json::Map<String, Value>) -> bool + Send + Sync>,
    },
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Structured { field, operator, value } => f
                .debug_struct("Filter::Structured")
                .field("field", field)
                .field("operator", operator)
                .field("value", value)
                .finish(),
            Filter::Custom { label, .. } => {
                f.debug_struct("Filter::Custom").field("label", label).finish()
            }
        }
    }
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Structured {
            field: field.into(),
            operator: FilterOperator::Equals,
            value: value.into(),
        }
    }

    pub fn structured(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Filter::Structured {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn custom(
        label: impl Into<String>,
        predicate: impl Fn(&serde_json::Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Filter::Custom {
            label: label.into(),
            predicate: std::sync::Arc::new(predicate),
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Filter::Structured { field, .. } => Some(field.as_str()),
            Filter::Custom { .. } => None,
        }
    }

    pub fn is_pushdown_eligible(&self, backend_supports_string_ops: bool) -> bool {
        match self {
            Filter::Structured { operator, .. } => {
                operator.is_unconditionally_pushdownable()
                    || (operator.is_string_operator() && backend_supports_string_ops)
            }
            Filter::Custom { .. } => false,
        }
    }

    /// Evaluates this filter in-process against a record's data. Used by
    /// the in-memory fallback executor and by [`Filter::Custom`] always.
    pub fn matches(&self, data: &serde_json::Map<String, Value>) -> bool {
        match self {
            Filter::Custom { predicate, .. } => predicate(data),
            Filter::Structured { field, operator, value } => {
                let actual = data.get(field);
                match operator {
                    FilterOperator::IsNull => actual.is_none_or(Value::is_null),
                    FilterOperator::IsNotNull => actual.is_some_and(|v| !v.is_null()),
                    FilterOperator::Equals => actual == Some(value),
                    FilterOperator::NotEquals => actual != Some(value),
                    FilterOperator::In => value
                        .as_array()
                        .is_some_and(|values| actual.is_some_and(|actual| values.contains(actual))),
                    FilterOperator::GreaterThan => compare_numeric(actual, value, |a, b| a > b),
                    FilterOperator::GreaterOrEqual => compare_numeric(actual, value, |a, b| a >= b),
                    FilterOperator::LessThan => compare_numeric(actual, value, |a, b| a < b),
                    FilterOperator::LessOrEqual => compare_numeric(actual, value, |a, b| a <= b),
                    FilterOperator::Like => compare_str(actual, value, |a, b| a.contains(b)),
                    FilterOperator::StartsWith => compare_str(actual, value, |a, b| a.starts_with(b)),
                    FilterOperator::EndsWith => compare_str(actual, value, |a, b| a.ends_with(b)),
                }
            }
        }
    }
}

fn compare_numeric(actual: Option<&Value>, expected: &Value, compare: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

fn compare_str(actual: Option<&Value>, expected: &Value, compare: impl Fn(&str, &str) -> bool) -> bool {
    match (actual.and_then(Value::as_str), expected.as_str()) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

/// Ascending/descending, with the nulls-first/last handling the §8
/// cross-schema scenario exercises (`ORDER BY stats.kills DESC NULLS
/// LAST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullHandling {
    Default,
    NullsFirst,
    NullsLast,
}

#[derive(Debug, Clone)]
pub struct SortOrder {
    pub schema: String,
    pub field: String,
    pub direction: SortDirection,
    pub nulls: NullHandling,
}

impl SortOrder {
    pub fn new(schema: impl Into<String>, field: impl Into<String>, direction: SortDirection) -> Self {
        SortOrder {
            schema: schema.into(),
            field: field.into(),
            direction,
            nulls: NullHandling::Default,
        }
    }

    pub fn with_nulls(mut self, nulls: NullHandling) -> Self {
        self.nulls = nulls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_pushes_down_everywhere() {
        let filter = Filter::eq("level", 10);
        assert!(filter.is_pushdown_eligible(false));
        assert!(filter.is_pushdown_eligible(true));
    }

    #[test]
    fn like_only_pushes_down_on_string_capable_backends() {
        let filter = Filter::structured("name", FilterOperator::Like, "foo");
        assert!(!filter.is_pushdown_eligible(false));
        assert!(filter.is_pushdown_eligible(true));
    }

    #[test]
    fn custom_predicate_never_pushes_down() {
        let filter = Filter::custom("always-true", |_| true);
        assert!(!filter.is_pushdown_eligible(true));
    }

    #[test]
    fn matches_evaluates_equals_in_process() {
        let mut data = serde_json::Map::new();
        data.insert("level".to_string(), serde_json::json!(12));
        let filter = Filter::structured("level", FilterOperator::GreaterThan, 10);
        assert!(filter.matches(&data));
        let filter = Filter::structured("level", FilterOperator::LessThan, 10);
        assert!(!filter.matches(&data));
    }
}
