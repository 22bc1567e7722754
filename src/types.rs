/// Result types produced by the aggregation engine.
///
/// Everything here is transient: built during one invocation and handed to
/// the caller, who serializes it as the chart payload. Numbers that happen to
/// be integral are written without a fractional part so that counts read as
/// `3`, not `3.0`.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Write an `f64` as an integer when it has no fractional part.
fn compact_number<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn compact_option<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(v) => compact_number(v, serializer),
        None => serializer.serialize_none(),
    }
}

/// The `progress` triple: completed count, total, and their ratio in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Completed records.
    #[serde(serialize_with = "compact_number")]
    pub value: f64,
    /// All records.
    #[serde(serialize_with = "compact_number")]
    pub max: f64,
    /// `value / max * 100`, or 0 for an empty group.
    #[serde(serialize_with = "compact_number")]
    pub percentage: f64,
}

/// The reduced value of one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationValue {
    /// Scalar reductions.
    Number(#[serde(serialize_with = "compact_number")] f64),
    /// The `progress` reduction.
    Progress(Progress),
}

impl AggregationValue {
    /// The headline number: the scalar itself, or the completed count.
    pub fn as_f64(&self) -> f64 {
        match self {
            AggregationValue::Number(n) => *n,
            AggregationValue::Progress(p) => p.value,
        }
    }
}

impl From<f64> for AggregationValue {
    fn from(value: f64) -> Self {
        AggregationValue::Number(value)
    }
}

/// One aggregated group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    /// Group label.
    pub group: String,
    /// Reduced value.
    pub value: AggregationValue,
    /// Records in the group.
    pub count: usize,
    /// Running total, set by `cumulative_count`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "compact_option"
    )]
    pub cumulative_value: Option<f64>,
    /// First calendar day of the bucket, for chronological ordering.
    #[serde(skip)]
    pub bucket_start: Option<NaiveDate>,
}

impl GroupResult {
    /// Create a group result.
    pub fn new(group: impl Into<String>, value: AggregationValue, count: usize) -> Self {
        Self {
            group: group.into(),
            value,
            count,
            cumulative_value: None,
            bucket_start: None,
        }
    }

    /// Attach the bucket start date.
    pub fn with_bucket_start(mut self, start: Option<NaiveDate>) -> Self {
        self.bucket_start = start;
        self
    }
}

/// The single row of an ungrouped aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarResult {
    /// Reduced value over all filtered records.
    pub value: AggregationValue,
}

/// One row of a forecast-vs-actual comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSeriesResult {
    /// Group label shared by both series.
    pub group: String,
    /// Value from the forecast series (0 if absent).
    #[serde(serialize_with = "compact_number")]
    pub forecast: f64,
    /// Value from the actual series (0 if absent).
    #[serde(serialize_with = "compact_number")]
    pub actual: f64,
    /// First calendar day of the bucket, for chronological ordering.
    #[serde(skip)]
    pub bucket_start: Option<NaiveDate>,
}

/// Engine output, serialized as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregationOutput {
    /// `[{value}]` for ungrouped aggregation.
    Scalar(Vec<ScalarResult>),
    /// Ordered group results.
    Grouped(Vec<GroupResult>),
    /// Ordered forecast/actual rows.
    Merged(Vec<MergedSeriesResult>),
}

impl AggregationOutput {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            AggregationOutput::Scalar(rows) => rows.len(),
            AggregationOutput::Grouped(rows) => rows.len(),
            AggregationOutput::Merged(rows) => rows.len(),
        }
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The group results, if this is a grouped output.
    pub fn groups(&self) -> Option<&[GroupResult]> {
        match self {
            AggregationOutput::Grouped(rows) => Some(rows),
            _ => None,
        }
    }

    /// The merged series rows, if this is a series comparison.
    pub fn merged(&self) -> Option<&[MergedSeriesResult]> {
        match self {
            AggregationOutput::Merged(rows) => Some(rows),
            _ => None,
        }
    }

    /// Serialize to a JSON value.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
