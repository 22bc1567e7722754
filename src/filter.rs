/// Filter engine.
///
/// Narrows a record set according to a [`FilterSpec`]. The list form is a
/// plain AND of conditions. The structured form applies each active category
/// as its own pass over the survivors of the previous one:
///
/// - `dateRange`: the record's own date (first of `date_done`,
///   `date_created`, `due_date`) must fall inside the window
/// - `weekdays`: that date must fall on one of the listed weekdays
/// - `status` / `priority`: semantic value must be in the set, ignoring case
/// - `customFieldFilters`: conditions against custom-field values
/// - `value_stream`: exact categorical match
/// - `modalities`: any overlap with a comma-joined set
///
/// Empty categories impose no constraint.
use crate::config::{Condition, EngineOptions, FilterSpec, StructuredFilters};
use crate::date_range;
use crate::error::{AnalyticsError, AnalyticsResult, ConfigError};
use crate::fields::{
    PriorityField, StatusField, coerce_number, coerce_string, get_path, record_date,
};
use crate::predicate::{CompiledCondition, Operator};
use chrono::{Datelike, Weekday};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Apply a filter specification, returning the surviving records in order.
pub fn apply<'a, I>(
    records: I,
    spec: Option<&FilterSpec>,
    options: &EngineOptions,
) -> AnalyticsResult<Vec<&'a JsonValue>>
where
    I: IntoIterator<Item = &'a JsonValue>,
{
    let all: Vec<&JsonValue> = records.into_iter().collect();
    let input = all.len();
    match spec {
        None => Ok(all),
        Some(FilterSpec::Conditions(conditions)) => {
            let compiled = conditions
                .iter()
                .map(|c| CompiledCondition::compile(c, options.unknown_operator))
                .collect::<AnalyticsResult<Vec<_>>>()?;
            let kept: Vec<&JsonValue> = all
                .into_iter()
                .filter(|r| compiled.iter().all(|c| c.matches(r)))
                .collect();
            tracing::debug!(input, output = kept.len(), "condition filter");
            Ok(kept)
        }
        Some(FilterSpec::Structured(filters)) => apply_structured(all, filters, options),
    }
}

fn apply_structured<'a>(
    mut records: Vec<&'a JsonValue>,
    filters: &StructuredFilters,
    options: &EngineOptions,
) -> AnalyticsResult<Vec<&'a JsonValue>> {
    let now = options.now();
    let offset = options.offset();

    if let Some(spec) = &filters.date_range {
        if let Some(window) = date_range::resolve(spec, &now)? {
            narrow(&mut records, "dateRange", |r| {
                record_date(r, &offset).is_some_and(|d| window.contains(&d))
            });
        }
    }

    let weekdays = weekday_set(&filters.weekdays)?;
    if !weekdays.is_empty() {
        narrow(&mut records, "weekdays", |r| {
            record_date(r, &offset).is_some_and(|d| weekdays.contains(&d.weekday()))
        });
    }

    let statuses = lowercase_set(&filters.status);
    if !statuses.is_empty() {
        narrow(&mut records, "status", |r| {
            StatusField::of(r).is_some_and(|s| statuses.contains(&s.as_str().to_lowercase()))
        });
    }

    let priorities = lowercase_set(&filters.priority);
    if !priorities.is_empty() {
        narrow(&mut records, "priority", |r| {
            PriorityField::of(r).is_some_and(|p| priorities.contains(&p.as_str().to_lowercase()))
        });
    }

    for condition in &filters.custom_field_filters {
        if is_placeholder(condition) {
            tracing::debug!(
                field = %condition.field,
                operator = %condition.operator,
                "skipping empty custom field filter"
            );
            continue;
        }
        let compiled = CompiledCondition::compile(condition, options.unknown_operator)?;
        narrow(&mut records, "customFieldFilters", |r| {
            compiled.matches_value(custom_field_value(r, &condition.field).as_ref())
        });
    }

    if let Some(stream) = filters.value_stream.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        narrow(&mut records, "value_stream", |r| {
            get_path(r, "value_stream").is_some_and(|v| coerce_string(v).trim() == stream)
        });
    }

    let modalities: HashSet<&str> = filters.modalities.iter().map(String::as_str).collect();
    if !modalities.is_empty() {
        narrow(&mut records, "modalities", |r| {
            record_modalities(r).iter().any(|m| modalities.contains(m.as_str()))
        });
    }

    Ok(records)
}

fn narrow<F>(records: &mut Vec<&JsonValue>, stage: &str, keep: F)
where
    F: Fn(&JsonValue) -> bool,
{
    let before = records.len();
    records.retain(|&r| keep(r));
    tracing::trace!(stage, before, after = records.len(), "filter pass");
}

/// Whether a custom-field filter carries only placeholder UI state.
///
/// A `null` value, or an empty array/string under `in`, `not_in` or
/// `contains`, means the user has not picked anything yet.
pub fn is_placeholder(condition: &Condition) -> bool {
    let empty = match &condition.value {
        JsonValue::Null => return true,
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    };
    empty
        && matches!(
            Operator::parse(&condition.operator),
            Some(Operator::In | Operator::NotIn | Operator::Contains)
        )
}

/// Resolve a custom field by id or name through the record's `custom_fields`
/// list, falling back to a direct path lookup.
///
/// Drop-down fields store an option index; it is mapped to the option name.
pub fn custom_field_value(record: &JsonValue, field: &str) -> Option<JsonValue> {
    let entry = record
        .get("custom_fields")
        .and_then(JsonValue::as_array)
        .and_then(|fields| {
            fields.iter().find(|f| {
                f.get("id").and_then(JsonValue::as_str) == Some(field)
                    || f.get("name").and_then(JsonValue::as_str) == Some(field)
            })
        });

    match entry {
        Some(entry) => {
            let value = entry.get("value")?;
            Some(dropdown_option_name(entry, value).unwrap_or_else(|| value.clone()))
        }
        None => get_path(record, field).cloned(),
    }
}

fn dropdown_option_name(entry: &JsonValue, value: &JsonValue) -> Option<JsonValue> {
    if entry.get("type").and_then(JsonValue::as_str) != Some("drop_down") {
        return None;
    }
    let index = coerce_number(value)?;
    entry
        .get("type_config")?
        .get("options")?
        .as_array()?
        .iter()
        .find(|opt| opt.get("orderindex").and_then(coerce_number) == Some(index))
        .and_then(|opt| opt.get("name").cloned())
}

fn weekday_set(names: &[String]) -> AnalyticsResult<HashSet<Weekday>> {
    names
        .iter()
        .map(|name| {
            name.trim().parse::<Weekday>().map_err(|_| {
                AnalyticsError::from(ConfigError::UnknownWeekday {
                    value: name.clone(),
                })
            })
        })
        .collect()
}

fn lowercase_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn record_modalities(record: &JsonValue) -> Vec<String> {
    let raw = get_path(record, "modalities").or_else(|| get_path(record, "modality"));
    let parts: Vec<String> = match raw {
        Some(JsonValue::Array(items)) => items.iter().map(coerce_string).collect(),
        Some(JsonValue::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(other) if !other.is_null() => vec![coerce_string(other)],
        _ => Vec::new(),
    };
    parts
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DateRangeSpec, UnknownOperatorPolicy};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn options() -> EngineOptions {
        EngineOptions::new()
            .reference_time(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap())
    }

    fn structured(filters: StructuredFilters) -> FilterSpec {
        FilterSpec::Structured(filters)
    }

    #[test]
    fn test_condition_list_is_and() {
        let records = vec![
            json!({"points": 5, "team": "a"}),
            json!({"points": 1, "team": "a"}),
            json!({"points": 8, "team": "b"}),
        ];
        let spec = FilterSpec::Conditions(vec![
            Condition::new("points", "greater_than", 2),
            Condition::new("team", "equals", "a"),
        ]);
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0]]);
    }

    #[test]
    fn test_no_spec_keeps_everything() {
        let records = vec![json!({}), json!({"a": 1})];
        assert_eq!(apply(&records, None, &options()).unwrap().len(), 2);
        let empty = structured(StructuredFilters::default());
        assert_eq!(apply(&records, Some(&empty), &options()).unwrap().len(), 2);
    }

    #[test]
    fn test_date_range_uses_first_present_date() {
        let records = vec![
            json!({"date_done": "2024-03-14", "date_created": "2023-01-01"}),
            json!({"date_created": "2024-03-10"}),
            json!({"due_date": "2024-03-01"}),
            json!({"title": "undated"}),
        ];
        let spec = structured(StructuredFilters {
            date_range: Some(DateRangeSpec::Token("last_7_days".into())),
            ..Default::default()
        });
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0], &records[1]]);
    }

    #[test]
    fn test_weekdays_filter() {
        // 2024-03-11 is a Monday, 2024-03-12 a Tuesday.
        let records = vec![
            json!({"date_created": "2024-03-11"}),
            json!({"date_created": "2024-03-12"}),
        ];
        let spec = structured(StructuredFilters {
            weekdays: vec!["Monday".into(), "fri".into()],
            ..Default::default()
        });
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0]]);
    }

    #[test]
    fn test_unknown_weekday_is_config_error() {
        let records = vec![json!({"date_created": "2024-03-11"})];
        let spec = structured(StructuredFilters {
            weekdays: vec!["Monday".into(), "Funday".into()],
            ..Default::default()
        });
        let err = apply(&records, Some(&spec), &options()).unwrap_err();
        assert!(err.is_invalid_configuration());
        assert!(err.to_string().contains("Funday"));
    }

    #[test]
    fn test_status_and_priority_shapes() {
        let records = vec![
            json!({"status": "open", "priority": {"priority": "high"}}),
            json!({"status": {"status": "Open"}, "priority": "low"}),
            json!({"status": {"status": "closed"}, "priority": "high"}),
        ];
        let spec = structured(StructuredFilters {
            status: vec!["open".into()],
            priority: vec!["HIGH".into()],
            ..Default::default()
        });
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0]]);
    }

    #[test]
    fn test_custom_field_placeholder_skipped() {
        let records = vec![json!({"f": 1}), json!({"f": 2}), json!({"g": 3})];
        for operator in ["in", "not_in", "contains"] {
            for value in [json!([]), json!(""), JsonValue::Null] {
                let spec = structured(StructuredFilters {
                    custom_field_filters: vec![Condition::new("f", operator, value)],
                    ..Default::default()
                });
                let out = apply(&records, Some(&spec), &options()).unwrap();
                assert_eq!(out.len(), 3, "{operator} should be skipped");
            }
        }
    }

    #[test]
    fn test_custom_field_lookup_and_dropdown() {
        let records = vec![
            json!({"custom_fields": [{
                "id": "cf1", "name": "Team", "type": "drop_down", "value": 1,
                "type_config": {"options": [
                    {"name": "Platform", "orderindex": 0},
                    {"name": "Growth", "orderindex": 1}
                ]}
            }]}),
            json!({"custom_fields": [{
                "id": "cf1", "name": "Team", "type": "drop_down", "value": 0,
                "type_config": {"options": [{"name": "Platform", "orderindex": 0}]}
            }]}),
            json!({"Team": "Growth"}),
        ];
        let spec = structured(StructuredFilters {
            custom_field_filters: vec![Condition::new("Team", "equals", "Growth")],
            ..Default::default()
        });
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0], &records[2]]);
    }

    #[test]
    fn test_value_stream_and_modalities() {
        let records = vec![
            json!({"value_stream": "Growth", "modalities": ["remote", "hybrid"]}),
            json!({"value_stream": "Growth", "modalities": "onsite"}),
            json!({"value_stream": "Core", "modalities": "remote"}),
        ];
        let spec = structured(StructuredFilters {
            value_stream: Some("Growth".into()),
            modalities: vec!["remote".into(), "hybrid".into()],
            ..Default::default()
        });
        let out = apply(&records, Some(&spec), &options()).unwrap();
        assert_eq!(out, vec![&records[0]]);

        let blank = structured(StructuredFilters {
            value_stream: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(apply(&records, Some(&blank), &options()).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_operator_rejected_by_default() {
        let records = vec![json!({"a": 1})];
        let spec = FilterSpec::Conditions(vec![Condition::new("a", "like", 1)]);
        assert!(apply(&records, Some(&spec), &options()).is_err());

        let lenient = options().unknown_operator(UnknownOperatorPolicy::Pass);
        assert_eq!(apply(&records, Some(&spec), &lenient).unwrap().len(), 1);
    }
}
