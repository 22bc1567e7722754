/// Calculated (derived) fields.
///
/// Each definition adds one field to every record. A small set of named
/// formulas covers the task-tracker metrics dashboards ask for; anything
/// else is treated as a constrained arithmetic formula (see [`crate::formula`]).
///
/// Named formulas that cannot be computed for a record yield `null` for that
/// record; arithmetic formulas that cannot be computed yield `0`.
use crate::config::CalculatedField;
use crate::fields::{DateValue, coerce_number, get_present, record_date_field};
use crate::formula;
use chrono::{DateTime, FixedOffset};
use serde_json::{Value as JsonValue, json};
use std::borrow::Cow;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Built-in formulas, referenced by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedFormula {
    /// Whole days since `date_created`.
    TaskAge,
    /// Whole days from `date_created` to `date_done`.
    TimeToCompletion,
    /// `time_spent / time_estimate` as a capped, rounded percentage.
    CompletionPercentage,
    /// Past `due_date` and not done.
    IsOverdue,
}

impl NamedFormula {
    /// Look up a named formula.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "task_age" => Some(NamedFormula::TaskAge),
            "time_to_completion" => Some(NamedFormula::TimeToCompletion),
            "completion_percentage" => Some(NamedFormula::CompletionPercentage),
            "is_overdue" => Some(NamedFormula::IsOverdue),
            _ => None,
        }
    }

    /// Compute the formula for one record; `None` becomes `null`.
    pub fn compute(self, record: &JsonValue, now: &DateTime<FixedOffset>) -> Option<JsonValue> {
        let offset = now.offset();
        match self {
            NamedFormula::TaskAge => {
                let created = record_date_field(record, "date_created", offset).valid()?;
                Some(json!(whole_days(&created, now)))
            }
            NamedFormula::TimeToCompletion => {
                let created = record_date_field(record, "date_created", offset).valid()?;
                let done = record_date_field(record, "date_done", offset).valid()?;
                Some(json!(whole_days(&created, &done)))
            }
            NamedFormula::CompletionPercentage => {
                let spent = get_present(record, "time_spent").and_then(coerce_number)?;
                let estimate = get_present(record, "time_estimate").and_then(coerce_number)?;
                if estimate == 0.0 {
                    return None;
                }
                Some(json!((spent / estimate * 100.0).min(100.0).round()))
            }
            NamedFormula::IsOverdue => {
                let overdue = match record_date_field(record, "due_date", offset) {
                    DateValue::Valid(due) => {
                        due < *now
                            && record_date_field(record, "date_done", offset) == DateValue::Missing
                    }
                    _ => false,
                };
                Some(JsonValue::Bool(overdue))
            }
        }
    }
}

fn whole_days(from: &DateTime<FixedOffset>, to: &DateTime<FixedOffset>) -> i64 {
    (*to - *from).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Evaluate one formula (named or arithmetic) against a record.
pub fn evaluate(formula_text: &str, record: &JsonValue, now: &DateTime<FixedOffset>) -> JsonValue {
    match NamedFormula::parse(formula_text) {
        Some(named) => named.compute(record, now).unwrap_or(JsonValue::Null),
        None => json!(formula::evaluate_or_zero(formula_text, record)),
    }
}

/// Add every calculated field to every record.
///
/// Records pass through untouched (borrowed) when there is nothing to add.
pub fn apply<'a>(
    records: Vec<&'a JsonValue>,
    definitions: &[CalculatedField],
    now: &DateTime<FixedOffset>,
) -> Vec<Cow<'a, JsonValue>> {
    if definitions.is_empty() {
        return records.into_iter().map(Cow::Borrowed).collect();
    }

    records
        .into_iter()
        .map(|record| {
            let JsonValue::Object(fields) = record else {
                return Cow::Borrowed(record);
            };
            let mut derived = fields.clone();
            for def in definitions {
                let value = evaluate(&def.formula, record, now);
                derived.insert(def.name.clone(), value);
            }
            Cow::Owned(JsonValue::Object(derived))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-15T12:00:00Z").unwrap()
    }

    #[test]
    fn test_task_age_and_time_to_completion() {
        let r = json!({
            "date_created": "2024-03-05T12:00:00Z",
            "date_done": "2024-03-08T18:00:00Z"
        });
        assert_eq!(evaluate("task_age", &r, &now()), json!(10));
        assert_eq!(evaluate("time_to_completion", &r, &now()), json!(3));
        let open = json!({"date_created": "2024-03-05T12:00:00Z"});
        assert_eq!(evaluate("time_to_completion", &open, &now()), JsonValue::Null);
    }

    #[test]
    fn test_completion_percentage() {
        let r = json!({"time_spent": 30, "time_estimate": 40});
        assert_eq!(evaluate("completion_percentage", &r, &now()), json!(75.0));
        let over = json!({"time_spent": "90", "time_estimate": "40"});
        assert_eq!(evaluate("completion_percentage", &over, &now()), json!(100.0));
        let missing = json!({"time_spent": 30});
        assert_eq!(evaluate("completion_percentage", &missing, &now()), JsonValue::Null);
    }

    #[test]
    fn test_is_overdue() {
        let late = json!({"due_date": "2024-03-01"});
        let done = json!({"due_date": "2024-03-01", "date_done": "2024-03-02"});
        let future = json!({"due_date": "2024-04-01"});
        assert_eq!(evaluate("is_overdue", &late, &now()), json!(true));
        assert_eq!(evaluate("is_overdue", &done, &now()), json!(false));
        assert_eq!(evaluate("is_overdue", &future, &now()), json!(false));
        assert_eq!(evaluate("is_overdue", &json!({}), &now()), json!(false));
    }

    #[test]
    fn test_apply_adds_fields_without_dropping_records() {
        let a = json!({"points": 2, "date_created": "bogus"});
        let b = json!("not an object");
        let defs = vec![
            CalculatedField::new("double", "points * 2"),
            CalculatedField::new("age", "task_age"),
        ];
        let out = apply(vec![&a, &b], &defs, &now());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["double"], json!(4.0));
        assert_eq!(out[0]["age"], JsonValue::Null);
        assert_eq!(*out[1], b);
        assert!(a.get("double").is_none());
    }
}
