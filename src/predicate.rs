/// Elementary filter predicates.
///
/// A predicate is a `(field, operator, value)` triple evaluated against one
/// record. Conditions arrive as loosely typed JSON, so they are compiled once
/// per request into [`CompiledCondition`]s: the operator name is resolved,
/// `between` bounds are checked, and unknown operators are either rejected or
/// turned into a pass-through depending on [`UnknownOperatorPolicy`].
use crate::config::{Condition, UnknownOperatorPolicy};
use crate::error::{AnalyticsResult, ConfigError};
use crate::fields::{coerce_number, coerce_string, get_path, loose_eq, parse_date_str};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Strict equality on raw values.
    Equals,
    /// Negated strict equality.
    NotEquals,
    /// Case-insensitive substring test on string forms.
    Contains,
    /// Negated substring test.
    NotContains,
    /// Numeric `>`.
    GreaterThan,
    /// Numeric `<`.
    LessThan,
    /// Numeric inclusive range `[low, high]`.
    Between,
    /// Membership in an array of values.
    In,
    /// Non-membership in an array of values.
    NotIn,
    /// Field absent or `null`.
    IsNull,
    /// Field present and not `null`.
    IsNotNull,
}

impl Operator {
    /// Resolve an operator name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "greater_than" => Operator::GreaterThan,
            "less_than" => Operator::LessThan,
            "between" => Operator::Between,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "is_null" => Operator::IsNull,
            "is_not_null" => Operator::IsNotNull,
            _ => return None,
        })
    }

    /// Evaluate this operator. `field_value` is `None` when the field is absent.
    pub fn evaluate(self, field_value: Option<&JsonValue>, filter_value: &JsonValue) -> bool {
        match self {
            Operator::Equals => field_value.is_some_and(|v| loose_eq(v, filter_value)),
            Operator::NotEquals => !Operator::Equals.evaluate(field_value, filter_value),
            Operator::Contains => field_value.is_some_and(|v| {
                coerce_string(v)
                    .to_lowercase()
                    .contains(&coerce_string(filter_value).to_lowercase())
            }),
            Operator::NotContains => !Operator::Contains.evaluate(field_value, filter_value),
            Operator::GreaterThan => compare(field_value, filter_value, |a, b| a > b),
            Operator::LessThan => compare(field_value, filter_value, |a, b| a < b),
            Operator::Between => match (field_value.and_then(comparable), bounds(filter_value)) {
                (Some(v), Some((low, high))) => low <= v && v <= high,
                _ => false,
            },
            Operator::In => field_value.is_some_and(|v| is_member(v, filter_value)),
            Operator::NotIn => !Operator::In.evaluate(field_value, filter_value),
            Operator::IsNull => field_value.is_none_or(JsonValue::is_null),
            Operator::IsNotNull => !Operator::IsNull.evaluate(field_value, filter_value),
        }
    }
}

/// Coerce to a number, reading date strings as epoch milliseconds.
fn comparable(value: &JsonValue) -> Option<f64> {
    coerce_number(value).or_else(|| {
        let utc: FixedOffset = Utc.fix();
        value
            .as_str()
            .and_then(|s| parse_date_str(s.trim(), &utc))
            .map(|dt| dt.timestamp_millis() as f64)
    })
}

fn compare(
    field_value: Option<&JsonValue>,
    filter_value: &JsonValue,
    op: fn(f64, f64) -> bool,
) -> bool {
    match (field_value.and_then(comparable), comparable(filter_value)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn bounds(filter_value: &JsonValue) -> Option<(f64, f64)> {
    match filter_value.as_array()?.as_slice() {
        [low, high] => Some((comparable(low)?, comparable(high)?)),
        _ => None,
    }
}

fn is_member(field_value: &JsonValue, filter_value: &JsonValue) -> bool {
    let in_set = |v: &JsonValue| match filter_value {
        JsonValue::Array(set) => set.iter().any(|item| loose_eq(v, item)),
        single => loose_eq(v, single),
    };
    match field_value {
        JsonValue::Array(items) => items.iter().any(in_set),
        v => in_set(v),
    }
}

/// Evaluate a single condition against a field value.
pub fn evaluate(
    field_value: Option<&JsonValue>,
    operator: Operator,
    filter_value: &JsonValue,
) -> bool {
    operator.evaluate(field_value, filter_value)
}

/// A condition with its operator resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    /// Field path to resolve on each record.
    pub field: String,
    /// `None` means the condition always passes (permissive policy only).
    pub operator: Option<Operator>,
    /// Comparison value.
    pub value: JsonValue,
}

impl CompiledCondition {
    /// Compile a condition under the given unknown-operator policy.
    pub fn compile(condition: &Condition, policy: UnknownOperatorPolicy) -> AnalyticsResult<Self> {
        let operator = match (Operator::parse(&condition.operator), policy) {
            (Some(op), _) => Some(op),
            (None, UnknownOperatorPolicy::Pass) => {
                tracing::warn!(
                    operator = %condition.operator,
                    field = %condition.field,
                    "unknown filter operator treated as always true"
                );
                None
            }
            (None, UnknownOperatorPolicy::Reject) => {
                return Err(ConfigError::UnknownOperator {
                    operator: condition.operator.clone(),
                    field: condition.field.clone(),
                }
                .into());
            }
        };

        if operator == Some(Operator::Between) && bounds(&condition.value).is_none() {
            return Err(ConfigError::InvalidBetween {
                field: condition.field.clone(),
            }
            .into());
        }

        Ok(Self {
            field: condition.field.clone(),
            operator,
            value: condition.value.clone(),
        })
    }

    /// Evaluate against a record, resolving the field path.
    pub fn matches(&self, record: &JsonValue) -> bool {
        self.matches_value(get_path(record, &self.field))
    }

    /// Evaluate against an already-resolved field value.
    pub fn matches_value(&self, field_value: Option<&JsonValue>) -> bool {
        self.operator
            .is_none_or(|op| op.evaluate(field_value, &self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(field: JsonValue, op: &str, value: JsonValue) -> bool {
        Operator::parse(op).unwrap().evaluate(Some(&field), &value)
    }

    #[test]
    fn test_equals_strict() {
        assert!(eval(json!("open"), "equals", json!("open")));
        assert!(!eval(json!("Open"), "equals", json!("open")));
        assert!(!eval(json!("1"), "equals", json!(1)));
        assert!(eval(json!(1), "equals", json!(1.0)));
        assert!(eval(json!("a"), "not_equals", json!("b")));
        assert!(Operator::NotEquals.evaluate(None, &json!("b")));
    }

    #[test]
    fn test_contains_case_insensitive() {
        assert!(eval(json!("Fix Login Bug"), "contains", json!("login")));
        assert!(eval(json!(12345), "contains", json!("234")));
        assert!(eval(json!(["Alpha", "Beta"]), "contains", json!("beta")));
        assert!(eval(json!("abc"), "not_contains", json!("X")));
        assert!(!Operator::Contains.evaluate(None, &json!("x")));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(eval(json!("10"), "greater_than", json!(9)));
        assert!(!eval(json!("ten"), "greater_than", json!(9)));
        assert!(eval(json!(3), "less_than", json!("4")));
        assert!(eval(json!("2024-02-01"), "greater_than", json!("2024-01-31")));
    }

    #[test]
    fn test_between_inclusive() {
        assert!(eval(json!(5), "between", json!([5, 10])));
        assert!(eval(json!(10), "between", json!([5, 10])));
        assert!(!eval(json!(11), "between", json!([5, 10])));
        assert!(!eval(json!(7), "between", json!([5])));
    }

    #[test]
    fn test_set_membership() {
        assert!(eval(json!("a"), "in", json!(["a", "b"])));
        assert!(!eval(json!("c"), "in", json!(["a", "b"])));
        assert!(eval(json!(["x", "b"]), "in", json!(["a", "b"])));
        assert!(eval(json!("c"), "not_in", json!(["a", "b"])));
    }

    #[test]
    fn test_null_tests() {
        assert!(Operator::IsNull.evaluate(None, &JsonValue::Null));
        assert!(Operator::IsNull.evaluate(Some(&JsonValue::Null), &JsonValue::Null));
        assert!(Operator::IsNotNull.evaluate(Some(&json!(0)), &JsonValue::Null));
    }

    #[test]
    fn test_unknown_operator_policy() {
        let cond = Condition::new("points", "fuzzy_match", 3);
        let err = CompiledCondition::compile(&cond, UnknownOperatorPolicy::Reject).unwrap_err();
        assert!(err.is_invalid_configuration());

        let pass = CompiledCondition::compile(&cond, UnknownOperatorPolicy::Pass).unwrap();
        assert!(pass.matches(&json!({"points": 1})));
        assert!(pass.matches(&json!({})));
    }

    #[test]
    fn test_between_shape_checked_at_compile() {
        let cond = Condition::new("points", "between", json!([1]));
        assert!(CompiledCondition::compile(&cond, UnknownOperatorPolicy::Reject).is_err());
    }

    #[test]
    fn test_compiled_condition_nested_path() {
        let cond = Condition::new("assignees[0].username", "equals", "kim");
        let compiled = CompiledCondition::compile(&cond, UnknownOperatorPolicy::Reject).unwrap();
        assert!(compiled.matches(&json!({"assignees": [{"username": "kim"}]})));
        assert!(!compiled.matches(&json!({"assignees": []})));
    }
}
