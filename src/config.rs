/// Aggregation configuration and engine options.
///
/// A dashboard widget sends its configuration as JSON alongside each request.
/// This module decodes it into typed structures (camelCase keys, with
/// snake_case aliases) and provides fluent builders for in-process callers.
///
/// # Example
///
/// ```ignore
/// use koru_analytics::config::{AggregationConfig, AggregationType, TimeGranularity};
///
/// let config = AggregationConfig::new(AggregationType::Sum)
///     .field("time_spent")
///     .time_group_by(TimeGranularity::Month);
/// ```
use crate::error::{AnalyticsResult, ConfigError};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    /// Number of records.
    #[default]
    Count,
    /// Sum of a numeric field.
    Sum,
    /// Mean of a numeric field.
    #[serde(alias = "average")]
    Avg,
    /// Smallest value of a numeric field.
    Min,
    /// Largest value of a numeric field.
    Max,
    /// `max - min` of a numeric field.
    Range,
    /// Median of a numeric field.
    Median,
    /// Number of distinct field values (or records, without a field).
    Distinct,
    /// Share of completed records, 0-100.
    Percentage,
    /// Completed/total/percentage triple.
    Progress,
    /// Running record count across ordered groups.
    CumulativeCount,
}

impl AggregationType {
    /// Whether this reduction is meaningless without a source field.
    pub fn requires_field(self) -> bool {
        matches!(
            self,
            AggregationType::Sum
                | AggregationType::Avg
                | AggregationType::Min
                | AggregationType::Max
                | AggregationType::Range
                | AggregationType::Median
        )
    }

    /// The wire name of this reduction.
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationType::Count => "count",
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Range => "range",
            AggregationType::Median => "median",
            AggregationType::Distinct => "distinct",
            AggregationType::Percentage => "percentage",
            AggregationType::Progress => "progress",
            AggregationType::CumulativeCount => "cumulative_count",
        }
    }
}

/// Calendar granularity for time bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    /// `2024-01-15`
    Day,
    /// `Week of Jan 14`
    Week,
    /// `2024-01`
    Month,
    /// `2024-Q1`
    Quarter,
    /// `2024`
    Year,
}

// ============================================================================
// Filters
// ============================================================================

/// One elementary filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field path (`status`, `custom.points`, `assignees[0].id`).
    #[serde(alias = "fieldId", alias = "field_id")]
    pub field: String,
    /// Operator name (`equals`, `between`, ...).
    pub operator: String,
    /// Comparison value; absent means `null`.
    #[serde(default)]
    pub value: JsonValue,
}

impl Condition {
    /// Create a condition.
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// A date window: a named token or explicit bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateRangeSpec {
    /// `"last_7_days"`, `"current_month"`, ...
    Token(String),
    /// `{"start": "2024-01-01", "end": "2024-01-31"}`
    Window {
        /// Inclusive lower bound (date string or epoch millis).
        start: JsonValue,
        /// Inclusive upper bound (date string or epoch millis).
        end: JsonValue,
    },
}

/// Named filter categories, each narrowing the record set independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredFilters {
    /// Date window on the record's own date.
    #[serde(default, alias = "date_range")]
    pub date_range: Option<DateRangeSpec>,
    /// Weekday names the record's date must fall on.
    #[serde(default, deserialize_with = "string_set")]
    pub weekdays: Vec<String>,
    /// Allowed statuses.
    #[serde(default, deserialize_with = "string_set")]
    pub status: Vec<String>,
    /// Allowed priorities.
    #[serde(default, deserialize_with = "string_set")]
    pub priority: Vec<String>,
    /// Conditions against custom-field values.
    #[serde(default, alias = "custom_field_filters")]
    pub custom_field_filters: Vec<Condition>,
    /// Exact value-stream match.
    #[serde(default, rename = "value_stream", alias = "valueStream")]
    pub value_stream: Option<String>,
    /// Comma-joined modality set.
    #[serde(default, deserialize_with = "string_set")]
    pub modalities: Vec<String>,
}

/// Filter specification: a condition list or a structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Conditions combined with AND.
    Conditions(Vec<Condition>),
    /// Named filter categories combined with AND.
    Structured(StructuredFilters),
}

/// Accept `"a,b"`, `["a", "b"]` or `null` as a set of trimmed, non-empty strings.
fn string_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<JsonValue>),
    }

    let raw: Option<OneOrMany> = Option::deserialize(deserializer)?;
    let items: Vec<String> = match raw {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => s.split(',').map(str::to_string).collect(),
        Some(OneOrMany::Many(values)) => values
            .iter()
            .map(crate::fields::coerce_string)
            .collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Treat `""` and `"none"` as no time bucketing.
fn optional_granularity<'de, D>(deserializer: D) -> Result<Option<TimeGranularity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("none") => Ok(None),
        Some(s) => {
            let de = serde::de::value::StrDeserializer::<D::Error>::new(s);
            TimeGranularity::deserialize(de).map(Some)
        }
    }
}

// ============================================================================
// Calculated fields
// ============================================================================

/// A derived per-record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedField {
    /// Name the derived value is stored under.
    pub name: String,
    /// A named formula (`task_age`, ...) or an arithmetic expression.
    pub formula: String,
}

impl CalculatedField {
    /// Create a calculated field definition.
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: formula.into(),
        }
    }
}

// ============================================================================
// Aggregation configuration
// ============================================================================

/// Per-request aggregation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    /// Name of the record source (`tasks`, `time_entries`); informational.
    #[serde(default, alias = "source_data")]
    pub source_data: Option<String>,
    /// Reduction applied to each group.
    #[serde(default, alias = "aggregation_type")]
    pub aggregation_type: AggregationType,
    /// Source field for numeric reductions.
    #[serde(default)]
    pub field: Option<String>,
    /// Categorical grouping field, or `day_of_week`.
    #[serde(default, alias = "group_by")]
    pub group_by: Option<String>,
    /// Calendar bucketing; takes precedence over `group_by`.
    #[serde(
        default,
        alias = "time_group_by",
        deserialize_with = "optional_granularity"
    )]
    pub time_group_by: Option<TimeGranularity>,
    /// Filters applied before anything else.
    #[serde(default)]
    pub filters: Option<FilterSpec>,
    /// Date field used for bucketing and weekday grouping.
    #[serde(default, alias = "date_field")]
    pub date_field: Option<String>,
    /// Derived fields computed after filtering.
    #[serde(default, alias = "calculated_fields")]
    pub calculated_fields: Vec<CalculatedField>,
}

/// Grouping key that maps records to weekday names.
pub const DAY_OF_WEEK: &str = "day_of_week";

impl AggregationConfig {
    /// Create a configuration for the given reduction.
    pub fn new(aggregation_type: AggregationType) -> Self {
        Self {
            aggregation_type,
            ..Self::default()
        }
    }

    /// Decode a configuration from JSON.
    pub fn from_json(value: &JsonValue) -> AnalyticsResult<Self> {
        Self::deserialize(value).map_err(|e| {
            ConfigError::Malformed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Set the source name.
    pub fn source_data(mut self, source: impl Into<String>) -> Self {
        self.source_data = Some(source.into());
        self
    }

    /// Set the source field.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Group by a field (or `day_of_week`).
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }

    /// Bucket by calendar granularity.
    pub fn time_group_by(mut self, granularity: TimeGranularity) -> Self {
        self.time_group_by = Some(granularity);
        self
    }

    /// Set the filter specification.
    pub fn filters(mut self, filters: FilterSpec) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Set the date field used for bucketing.
    pub fn date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    /// Add a calculated field.
    pub fn calculated_field(mut self, name: impl Into<String>, formula: impl Into<String>) -> Self {
        self.calculated_fields.push(CalculatedField::new(name, formula));
        self
    }

    /// The source field, ignoring blanks.
    pub fn field_name(&self) -> Option<&str> {
        non_blank(self.field.as_deref())
    }

    /// The categorical grouping field, ignoring blanks.
    pub fn group_by_field(&self) -> Option<&str> {
        non_blank(self.group_by.as_deref())
    }

    /// The configured date field, ignoring blanks.
    pub fn date_field_name(&self) -> Option<&str> {
        non_blank(self.date_field.as_deref())
    }

    /// Whether records are grouped by weekday (and not time-bucketed).
    pub fn is_day_of_week(&self) -> bool {
        self.time_group_by.is_none() && self.group_by_field() == Some(DAY_OF_WEEK)
    }

    /// Check configuration-shape invariants.
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.aggregation_type.requires_field() && self.field_name().is_none() {
            return Err(ConfigError::MissingField {
                aggregation: self.aggregation_type.as_str().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Engine options
// ============================================================================

/// What to do with a filter condition whose operator is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownOperatorPolicy {
    /// Fail the request with a configuration error.
    #[default]
    Reject,
    /// Treat the condition as always true (legacy behavior).
    Pass,
}

/// Engine-wide options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Instant treated as "now"; defaults to the wall clock at invocation.
    pub reference_time: Option<DateTime<Utc>>,
    /// Calendar offset for buckets, weekdays and date ranges (default UTC).
    pub utc_offset_minutes: i32,
    /// Handling of unrecognized filter operators.
    pub unknown_operator: UnknownOperatorPolicy,
}

impl EngineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin "now" to a fixed instant.
    pub fn reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }

    /// Set the calendar offset in minutes east of UTC.
    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Set the unknown-operator policy.
    pub fn unknown_operator(mut self, policy: UnknownOperatorPolicy) -> Self {
        self.unknown_operator = policy;
        self
    }

    /// The calendar offset; out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// "Now" in the calendar offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.reference_time
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.offset())
    }
}
