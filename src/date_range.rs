/// Named date ranges.
///
/// Dashboard widgets express time filters as tokens relative to "now"
/// (`last_7_days`, `current_month`, ...) or as explicit `{start, end}` bounds.
/// Both resolve to an inclusive [`DateWindow`] in the engine's calendar offset.
/// Weeks start on Sunday.
use crate::config::DateRangeSpec;
use crate::error::{AnalyticsResult, ConfigError};
use crate::fields::{DateValue, parse_date};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

static RELATIVE_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(last|next)_(\d{1,4})_days$").expect("valid regex"));

/// An inclusive window; an absent bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Earliest instant included.
    pub start: Option<DateTime<FixedOffset>>,
    /// Latest instant included.
    pub end: Option<DateTime<FixedOffset>>,
}

impl DateWindow {
    /// A window covering whole calendar days `first..=last`.
    pub fn days(first: NaiveDate, last: NaiveDate, offset: &FixedOffset) -> Self {
        Self {
            start: Some(start_of_day(first, offset)),
            end: Some(end_of_day(last, offset)),
        }
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        self.start.is_none_or(|s| s <= *at) && self.end.is_none_or(|e| *at <= e)
    }
}

/// Resolve a date-range spec. `Ok(None)` means no constraint.
pub fn resolve(
    spec: &DateRangeSpec,
    now: &DateTime<FixedOffset>,
) -> AnalyticsResult<Option<DateWindow>> {
    match spec {
        DateRangeSpec::Token(token) => resolve_token(token, now),
        DateRangeSpec::Window { start, end } => {
            let offset = now.offset();
            let start = bound(start, offset, false)?;
            let end = bound(end, offset, true)?;
            if start.is_none() && end.is_none() {
                return Ok(None);
            }
            Ok(Some(DateWindow { start, end }))
        }
    }
}

/// Resolve a named token relative to `now`.
pub fn resolve_token(
    token: &str,
    now: &DateTime<FixedOffset>,
) -> AnalyticsResult<Option<DateWindow>> {
    let token = token.trim().to_ascii_lowercase();
    if matches!(token.as_str(), "" | "all" | "all_time") {
        return Ok(None);
    }

    window_for(&token, now)
        .map(Some)
        .ok_or_else(|| ConfigError::UnknownDateRange { token }.into())
}

fn window_for(token: &str, now: &DateTime<FixedOffset>) -> Option<DateWindow> {
    let offset = now.offset();
    let today = now.date_naive();
    let days = |first: NaiveDate, last: NaiveDate| Some(DateWindow::days(first, last, offset));

    if let Some(caps) = RELATIVE_DAYS.captures(token) {
        let n: i64 = caps[2].parse().ok()?;
        let span = Duration::days(n.max(1) - 1);
        return match &caps[1] {
            "last" => days(today - span, today),
            _ => days(today, today + span),
        };
    }

    match token {
        "today" => days(today, today),
        "yesterday" => {
            let y = today.pred_opt()?;
            days(y, y)
        }
        "this_week" | "current_week" => {
            let sunday = week_start(today);
            days(sunday, sunday + Duration::days(6))
        }
        "last_week" => {
            let sunday = week_start(today) - Duration::days(7);
            days(sunday, sunday + Duration::days(6))
        }
        "this_month" | "current_month" => {
            let first = month_start(today.year(), today.month())?;
            days(first, next_month_start(first)?.pred_opt()?)
        }
        "last_month" => {
            let first_this = month_start(today.year(), today.month())?;
            let last = first_this.pred_opt()?;
            days(month_start(last.year(), last.month())?, last)
        }
        "this_quarter" | "current_quarter" => {
            let first = quarter_start(today)?;
            days(first, add_months(first, 3)?.pred_opt()?)
        }
        "last_quarter" => {
            let first_this = quarter_start(today)?;
            days(add_months(first_this, -3)?, first_this.pred_opt()?)
        }
        "this_year" | "current_year" => days(
            NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            NaiveDate::from_ymd_opt(today.year(), 12, 31)?,
        ),
        "last_year" => days(
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)?,
            NaiveDate::from_ymd_opt(today.year() - 1, 12, 31)?,
        ),
        _ => None,
    }
}

fn bound(
    value: &JsonValue,
    offset: &FixedOffset,
    is_end: bool,
) -> AnalyticsResult<Option<DateTime<FixedOffset>>> {
    match parse_date(Some(value), offset) {
        DateValue::Missing => Ok(None),
        DateValue::Invalid => Err(ConfigError::InvalidDateBound {
            value: crate::fields::coerce_string(value),
        }
        .into()),
        DateValue::Valid(dt) => {
            let date_only = value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok());
            if is_end && date_only {
                Ok(Some(end_of_day(dt.date_naive(), offset)))
            } else {
                Ok(Some(dt))
            }
        }
    }
}

// ============================================================================
// Calendar helpers
// ============================================================================

/// Midnight at the start of `date` in `offset`.
pub fn start_of_day(date: NaiveDate, offset: &FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(chrono::NaiveTime::MIN);
    offset.from_utc_datetime(&(local - Duration::seconds(offset.local_minus_utc() as i64)))
}

/// The last millisecond of `date` in `offset`.
pub fn end_of_day(date: NaiveDate, offset: &FixedOffset) -> DateTime<FixedOffset> {
    start_of_day(date, offset) + Duration::days(1) - Duration::milliseconds(1)
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month_start(first: NaiveDate) -> Option<NaiveDate> {
    add_months(first, 1)
}

fn quarter_start(date: NaiveDate) -> Option<NaiveDate> {
    month_start(date.year(), (date.month0() / 3) * 3 + 1)
}

/// Shift a first-of-month date by whole months.
fn add_months(first: NaiveDate, months: i32) -> Option<NaiveDate> {
    let index = first.year() * 12 + first.month0() as i32 + months;
    month_start(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}
