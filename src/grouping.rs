/// Grouping and time bucketing.
///
/// Every record gets exactly one group key:
///
/// - time bucket (`timeGroupBy`, date field default `date_created`):
///   `2024-01-15`, `Week of Jan 14`, `2024-01`, `2024-Q1`, `2024`,
///   or `unknown` / `invalid` when the date is missing / unparseable
/// - `day_of_week` (date field default `date_done`): weekday name or `No Date`
/// - any other `groupBy`: the field's label
///
/// A time bucket wins when both `timeGroupBy` and `groupBy` are set.
use crate::config::{AggregationConfig, DAY_OF_WEEK, TimeGranularity};
use crate::date_range::week_start;
use crate::fields::{
    DateValue, PriorityField, StatusField, display_label, get_present, record_date_field,
};
use chrono::{Datelike, FixedOffset, NaiveDate, Weekday};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Label for records whose date is absent.
pub const UNKNOWN_BUCKET: &str = "unknown";
/// Label for records whose date does not parse.
pub const INVALID_BUCKET: &str = "invalid";
/// Weekday label for records without a date.
pub const NO_DATE: &str = "No Date";
/// Categorical label for records without a value.
pub const NO_VALUE: &str = "None";

/// Weekday labels in display order.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// A group label plus the first day of its bucket, when it is a time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    /// Display label.
    pub label: String,
    /// First calendar day of the bucket.
    pub bucket_start: Option<NaiveDate>,
}

impl GroupKey {
    fn plain(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bucket_start: None,
        }
    }
}

/// How records are partitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    /// One group holding everything.
    Ungrouped,
    /// By the label of a field.
    Field(String),
    /// By weekday of a date field.
    DayOfWeek { date_field: String },
    /// By calendar bucket of a date field.
    Time {
        granularity: TimeGranularity,
        date_field: String,
    },
}

impl Grouping {
    /// Derive the grouping from a configuration.
    pub fn from_config(config: &AggregationConfig) -> Self {
        if let Some(granularity) = config.time_group_by {
            return Grouping::Time {
                granularity,
                date_field: config.date_field_name().unwrap_or("date_created").to_string(),
            };
        }
        match config.group_by_field() {
            None => Grouping::Ungrouped,
            Some(DAY_OF_WEEK) => Grouping::DayOfWeek {
                date_field: config.date_field_name().unwrap_or("date_done").to_string(),
            },
            Some(field) => Grouping::Field(field.to_string()),
        }
    }

    /// Compute the group key of one record.
    pub fn key_for(&self, record: &JsonValue, offset: &FixedOffset) -> GroupKey {
        match self {
            Grouping::Ungrouped => GroupKey::plain("all"),
            Grouping::Field(field) => GroupKey::plain(field_label(record, field)),
            Grouping::DayOfWeek { date_field } => {
                match record_date_field(record, date_field, offset) {
                    DateValue::Valid(dt) => GroupKey::plain(weekday_name(dt.weekday())),
                    _ => GroupKey::plain(NO_DATE),
                }
            }
            Grouping::Time {
                granularity,
                date_field,
            } => match record_date_field(record, date_field, offset) {
                DateValue::Missing => GroupKey::plain(UNKNOWN_BUCKET),
                DateValue::Invalid => GroupKey::plain(INVALID_BUCKET),
                DateValue::Valid(dt) => bucket(dt.date_naive(), *granularity),
            },
        }
    }

    /// Whether keys are calendar buckets.
    pub fn is_time(&self) -> bool {
        matches!(self, Grouping::Time { .. })
    }
}

/// Label a record by a categorical field.
///
/// `status` and `priority` go through their semantic accessors so that the
/// nested API shape groups together with the flat one.
pub fn field_label(record: &JsonValue, field: &str) -> String {
    let semantic = match field {
        "status" => StatusField::of(record).map(|s| s.as_str().to_string()),
        "priority" => PriorityField::of(record).map(|p| p.as_str().to_string()),
        _ => None,
    };
    semantic
        .or_else(|| get_present(record, field).map(display_label))
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| NO_VALUE.to_string())
}

/// Full English weekday name.
pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

/// Bucket a calendar date.
pub fn bucket(date: NaiveDate, granularity: TimeGranularity) -> GroupKey {
    let (label, start) = match granularity {
        TimeGranularity::Day => (date.format("%Y-%m-%d").to_string(), Some(date)),
        TimeGranularity::Week => {
            let sunday = week_start(date);
            (format!("Week of {}", sunday.format("%b %-d")), Some(sunday))
        }
        TimeGranularity::Month => (
            format!("{:04}-{:02}", date.year(), date.month()),
            date.with_day(1),
        ),
        TimeGranularity::Quarter => {
            let quarter = date.month0() / 3 + 1;
            (
                format!("{:04}-Q{}", date.year(), quarter),
                NaiveDate::from_ymd_opt(date.year(), (quarter - 1) * 3 + 1, 1),
            )
        }
        TimeGranularity::Year => (
            format!("{:04}", date.year()),
            NaiveDate::from_ymd_opt(date.year(), 1, 1),
        ),
    };
    GroupKey {
        label,
        bucket_start: start,
    }
}

/// Partition records by group key, keeping groups in first-seen order.
pub fn partition<'r, I>(
    records: I,
    grouping: &Grouping,
    offset: &FixedOffset,
) -> Vec<(GroupKey, Vec<&'r JsonValue>)>
where
    I: IntoIterator<Item = &'r JsonValue>,
{
    let mut groups: Vec<(GroupKey, Vec<&'r JsonValue>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = grouping.key_for(record, offset);
        match index.get(&key.label) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(key.label.clone(), groups.len());
                groups.push((key, vec![record]));
            }
        }
    }

    tracing::trace!(groups = groups.len(), "partitioned records");
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationType;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bucket_labels() {
        let d = day(2024, 1, 17);
        assert_eq!(bucket(d, TimeGranularity::Day).label, "2024-01-17");
        assert_eq!(bucket(d, TimeGranularity::Week).label, "Week of Jan 14");
        assert_eq!(bucket(d, TimeGranularity::Month).label, "2024-01");
        assert_eq!(bucket(d, TimeGranularity::Quarter).label, "2024-Q1");
        assert_eq!(bucket(day(2024, 11, 2), TimeGranularity::Quarter).label, "2024-Q4");
        assert_eq!(bucket(d, TimeGranularity::Year).label, "2024");
    }

    #[test]
    fn test_week_bucket_spans_year_boundary() {
        // 2025-01-01 is a Wednesday; its week starts Sunday 2024-12-29.
        let key = bucket(day(2025, 1, 1), TimeGranularity::Week);
        assert_eq!(key.label, "Week of Dec 29");
        assert_eq!(key.bucket_start, Some(day(2024, 12, 29)));
    }

    #[test]
    fn test_same_month_same_key() {
        let grouping = Grouping::from_config(
            &AggregationConfig::new(AggregationType::Count).time_group_by(TimeGranularity::Month),
        );
        let a = grouping.key_for(&json!({"date_created": "2024-01-15"}), &utc());
        let b = grouping.key_for(&json!({"date_created": "2024-01-31"}), &utc());
        assert_eq!(a.label, "2024-01");
        assert_eq!(a, b);
    }

    #[test]
    fn test_time_sentinels() {
        let grouping = Grouping::Time {
            granularity: TimeGranularity::Day,
            date_field: "date_created".into(),
        };
        assert_eq!(grouping.key_for(&json!({}), &utc()).label, UNKNOWN_BUCKET);
        assert_eq!(
            grouping.key_for(&json!({"date_created": "soon"}), &utc()).label,
            INVALID_BUCKET
        );
    }

    #[test]
    fn test_day_of_week_defaults_to_date_done() {
        let grouping = Grouping::from_config(
            &AggregationConfig::new(AggregationType::Count).group_by(DAY_OF_WEEK),
        );
        // 2024-03-11 is a Monday.
        let done = json!({"date_done": "2024-03-11", "date_created": "2024-03-12"});
        assert_eq!(grouping.key_for(&done, &utc()).label, "Monday");
        assert_eq!(grouping.key_for(&json!({"date_created": "2024-03-12"}), &utc()).label, NO_DATE);
    }

    #[test]
    fn test_time_bucket_takes_precedence() {
        let config = AggregationConfig::new(AggregationType::Count)
            .group_by("status")
            .time_group_by(TimeGranularity::Year);
        assert!(Grouping::from_config(&config).is_time());
    }

    #[test]
    fn test_field_labels() {
        assert_eq!(
            field_label(&json!({"status": {"status": "in review"}}), "status"),
            "in review"
        );
        assert_eq!(
            field_label(&json!({"priority": {"priority": "high", "id": "2"}}), "priority"),
            "high"
        );
        assert_eq!(
            field_label(&json!({"assignee": {"id": 9, "name": "Ana"}}), "assignee"),
            "Ana"
        );
        assert_eq!(field_label(&json!({"list": {"id": "L1"}}), "list"), "L1");
        assert_eq!(field_label(&json!({"points": 3}), "points"), "3");
        assert_eq!(field_label(&json!({}), "points"), NO_VALUE);
    }

    #[test]
    fn test_partition_first_seen_order() {
        let records = vec![
            json!({"team": "b"}),
            json!({"team": "a"}),
            json!({"team": "b"}),
        ];
        let groups = partition(&records, &Grouping::Field("team".into()), &utc());
        let labels: Vec<_> = groups.iter().map(|(k, v)| (k.label.as_str(), v.len())).collect();
        assert_eq!(labels, vec![("b", 2), ("a", 1)]);
    }
}
