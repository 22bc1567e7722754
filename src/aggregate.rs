/// Aggregation function library.
///
/// Reduces one group of records to an [`AggregationValue`]. Every reduction
/// is total: an empty group yields `0` (or an all-zero progress triple) and
/// bad field values are coerced rather than rejected.
///
/// | type | result |
/// |---|---|
/// | `count`, `cumulative_count` | number of records |
/// | `sum`, `avg` | sum / mean over all records, non-numeric as 0 |
/// | `min`, `max`, `range` | over present values, non-numeric as 0; 0 if none |
/// | `median` | middle present value, mean of the two middles for even sizes |
/// | `distinct` | distinct field values, or records without a field |
/// | `percentage` | completed / total * 100 |
/// | `progress` | `{value: completed, max: total, percentage}` |
use crate::config::AggregationType;
use crate::fields::{
    PriorityField, StatusField, coerce_number, format_number, get_path, get_present, is_completed,
    number_or_zero,
};
use crate::types::{AggregationValue, Progress};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Reduce a group of records.
///
/// `field` must be set for the numeric reductions; the engine validates this
/// before calling in, and a missing field here reduces over nothing.
pub fn reduce(
    records: &[&JsonValue],
    aggregation: AggregationType,
    field: Option<&str>,
) -> AggregationValue {
    let n = records.len();
    let number = AggregationValue::Number;

    match aggregation {
        AggregationType::Count | AggregationType::CumulativeCount => number(n as f64),
        AggregationType::Sum => number(sum(records, field)),
        AggregationType::Avg => {
            if n == 0 {
                number(0.0)
            } else {
                number(sum(records, field) / n as f64)
            }
        }
        AggregationType::Min => number(extremes(records, field).map_or(0.0, |(min, _)| min)),
        AggregationType::Max => number(extremes(records, field).map_or(0.0, |(_, max)| max)),
        AggregationType::Range => {
            number(extremes(records, field).map_or(0.0, |(min, max)| max - min))
        }
        AggregationType::Median => number(median(present_values(records, field))),
        AggregationType::Distinct => number(distinct(records, field) as f64),
        AggregationType::Percentage => number(progress(records).percentage),
        AggregationType::Progress => AggregationValue::Progress(progress(records)),
    }
}

fn sum(records: &[&JsonValue], field: Option<&str>) -> f64 {
    let Some(field) = field else { return 0.0 };
    records.iter().map(|r| number_or_zero(get_path(r, field))).sum()
}

/// Values of a field on the records that carry it, non-numeric as 0.
fn present_values(records: &[&JsonValue], field: Option<&str>) -> Vec<f64> {
    let Some(field) = field else { return Vec::new() };
    records
        .iter()
        .filter_map(|r| get_present(r, field))
        .map(|v| coerce_number(v).unwrap_or(0.0))
        .collect()
}

fn extremes(records: &[&JsonValue], field: Option<&str>) -> Option<(f64, f64)> {
    let (min, max) = present_values(records, field)
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (min <= max).then_some((min, max))
}

/// Median of a set of values; 0 for an empty set.
pub fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn distinct(records: &[&JsonValue], field: Option<&str>) -> usize {
    let Some(field) = field else { return records.len() };
    records
        .iter()
        .filter_map(|r| distinct_key(r, field))
        .collect::<HashSet<_>>()
        .len()
}

fn distinct_key(record: &JsonValue, field: &str) -> Option<String> {
    match field {
        "status" => StatusField::of(record).map(|s| s.as_str().to_string()),
        "priority" => PriorityField::of(record).map(|p| p.as_str().to_string()),
        _ => get_present(record, field)
            .map(|v| v.as_f64().map_or_else(|| v.to_string(), format_number)),
    }
}

fn progress(records: &[&JsonValue]) -> Progress {
    let total = records.len() as f64;
    let completed = records.iter().filter(|r| is_completed(r)).count() as f64;
    Progress {
        value: completed,
        max: total,
        percentage: if total == 0.0 { 0.0 } else { completed * 100.0 / total },
    }
}
