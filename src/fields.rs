/// Field access and value coercion for raw records.
///
/// Records are open-ended JSON objects coming straight from the task tracker.
/// This module is the only place that knows how to:
///
/// - resolve a dotted/bracket path (`assignees[0].username`, `a.b.0`)
/// - read the two semantic fields whose shape varies between sources
///   (`status` and `priority`, either bare strings or `{status: "..."}` objects)
/// - coerce JSON values to numbers and strings with JavaScript-like leniency
/// - parse dates given as epoch milliseconds or strings
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Date fields consulted, in order, when a record's "own" date is needed.
pub const RECORD_DATE_FIELDS: [&str; 3] = ["date_done", "date_created", "due_date"];

/// Object keys preferred over raw stringification when labelling a value.
const LABEL_KEYS: [&str; 6] = ["name", "title", "username", "status", "priority", "id"];

// ============================================================================
// Path lookup
// ============================================================================

/// Resolve a dotted/bracket path against a JSON value.
///
/// `a.b[0]`, `a.b.0` and `a[b]` are all accepted. A plain key containing
/// neither `.` nor `[` is looked up directly, so keys such as `Story Points`
/// work without quoting.
pub fn get_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if !path.contains(['.', '[']) {
        return value.get(path);
    }

    let mut current = value;
    for segment in path_segments(path) {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '[', ']']).filter(|s| !s.is_empty())
}

/// Resolve a path and treat JSON `null` as absent.
pub fn get_present<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    get_path(value, path).filter(|v| !v.is_null())
}

// ============================================================================
// Semantic accessors
// ============================================================================

/// A record's status, as delivered by either the flat or the nested API shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StatusField {
    /// `"status": "open"`
    Bare(String),
    /// `"status": {"status": "open", "color": "#d3d3d3", ...}`
    Nested { status: String },
}

impl StatusField {
    /// Read the status of a record, if it has one in a recognized shape.
    pub fn of(record: &JsonValue) -> Option<Self> {
        record
            .get("status")
            .and_then(|v| StatusField::deserialize(v).ok())
    }

    /// The inner status string.
    pub fn as_str(&self) -> &str {
        match self {
            StatusField::Bare(s) => s,
            StatusField::Nested { status } => status,
        }
    }

    /// Whether this status counts as finished work.
    pub fn is_complete(&self) -> bool {
        let s = self.as_str();
        s.eq_ignore_ascii_case("complete") || s.eq_ignore_ascii_case("closed")
    }
}

/// A record's priority, as delivered by either the flat or the nested API shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PriorityField {
    /// `"priority": "high"`
    Bare(String),
    /// `"priority": {"id": "2", "priority": "high", ...}`
    Nested { priority: String },
}

impl PriorityField {
    /// Read the priority of a record, if it has one in a recognized shape.
    pub fn of(record: &JsonValue) -> Option<Self> {
        record
            .get("priority")
            .and_then(|v| PriorityField::deserialize(v).ok())
    }

    /// The inner priority string.
    pub fn as_str(&self) -> &str {
        match self {
            PriorityField::Bare(s) => s,
            PriorityField::Nested { priority } => priority,
        }
    }
}

/// Whether a record counts as completed work.
///
/// Completed means a `complete`/`closed` status (flat or nested) or the
/// presence of a `date_done`.
pub fn is_completed(record: &JsonValue) -> bool {
    StatusField::of(record).is_some_and(|s| s.is_complete())
        || get_present(record, "date_done").is_some_and(|v| v.as_str() != Some(""))
}

// ============================================================================
// Coercion
// ============================================================================

/// Coerce a JSON value to a number.
///
/// Numbers pass through, numeric strings are parsed, booleans become 1/0.
/// Everything else (including empty strings and `null`) has no numeric value.
pub fn coerce_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Numeric coercion where anything non-numeric counts as zero.
pub fn number_or_zero(value: Option<&JsonValue>) -> f64 {
    value.and_then(coerce_number).unwrap_or(0.0)
}

/// Coerce a JSON value to its plain string form.
///
/// Strings are returned without quotes, arrays are comma-joined and `null`
/// becomes the empty string.
pub fn coerce_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.as_f64().map(format_number).unwrap_or_default(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Array(items) => items.iter().map(coerce_string).collect::<Vec<_>>().join(","),
        JsonValue::Object(_) => value.to_string(),
    }
}

/// Label a value for use as a group key or distinct-set member.
///
/// Objects are labelled by their first present `name`/`title`/`username`/
/// `status`/`priority`/`id` subfield, arrays by their labelled members.
pub fn display_label(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => LABEL_KEYS
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
            .map(display_label)
            .unwrap_or_else(|| value.to_string()),
        JsonValue::Array(items) => items
            .iter()
            .map(display_label)
            .collect::<Vec<_>>()
            .join(", "),
        other => coerce_string(other),
    }
}

/// Format a number without a trailing `.0` when it is integral.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Numeric equality across integer/float representations, strict otherwise.
pub fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

// ============================================================================
// Dates
// ============================================================================

/// Outcome of reading a date out of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    /// Field absent, `null` or empty.
    Missing,
    /// Field present but not a recognizable date.
    Invalid,
    /// Parsed date in the engine's calendar offset.
    Valid(DateTime<FixedOffset>),
}

impl DateValue {
    /// The parsed date, if any.
    pub fn valid(self) -> Option<DateTime<FixedOffset>> {
        match self {
            DateValue::Valid(dt) => Some(dt),
            _ => None,
        }
    }
}

/// Parse a date given as epoch milliseconds (number or digit string) or as
/// an RFC 3339 / ISO-like string. Zone-less strings are read in `offset`.
pub fn parse_date(value: Option<&JsonValue>, offset: &FixedOffset) -> DateValue {
    let parsed = match value {
        None | Some(JsonValue::Null) => return DateValue::Missing,
        Some(JsonValue::Number(n)) => n.as_f64().and_then(|ms| from_millis(ms as i64, offset)),
        Some(JsonValue::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return DateValue::Missing;
            }
            parse_date_str(s, offset)
        }
        Some(_) => None,
    };
    parsed.map_or(DateValue::Invalid, DateValue::Valid)
}

/// Parse a date string; see [`parse_date`].
pub fn parse_date_str(s: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(|ms| from_millis(ms, offset));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(offset));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return offset.from_local_datetime(&naive).single();
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| offset.from_local_datetime(&d.and_hms_opt(0, 0, 0)?).single())
}

fn from_millis(ms: i64, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.with_timezone(offset))
}

/// Parse a named date field of a record.
pub fn record_date_field(record: &JsonValue, field: &str, offset: &FixedOffset) -> DateValue {
    parse_date(get_path(record, field), offset)
}

/// The record's own date: the first of `date_done`, `date_created`,
/// `due_date` that is present, parsed.
pub fn record_date(record: &JsonValue, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    RECORD_DATE_FIELDS
        .iter()
        .map(|field| record_date_field(record, field, offset))
        .find(|d| *d != DateValue::Missing)
        .and_then(DateValue::valid)
}
