/// Deterministic ordering of aggregated groups.
///
/// Groups are sorted once, after aggregation:
///
/// 1. `day_of_week`: Monday through Sunday, then `No Date`
/// 2. time buckets: chronological, `unknown` / `invalid` last
/// 3. otherwise: by label
///
/// All sorts are stable, so rows that compare equal keep their relative
/// position. The cumulative pass for `cumulative_count` must run after this.
use crate::grouping::{Grouping, INVALID_BUCKET, NO_DATE, UNKNOWN_BUCKET, WEEKDAYS};
use crate::types::{GroupResult, MergedSeriesResult};
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Which ordering rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// Fixed weekday order.
    DayOfWeek,
    /// Chronological by bucket.
    Chronological,
    /// Lexicographic by label.
    Label,
}

impl OrderMode {
    /// The ordering rule for a grouping.
    pub fn for_grouping(grouping: &Grouping) -> Self {
        match grouping {
            Grouping::DayOfWeek { .. } => OrderMode::DayOfWeek,
            Grouping::Time { .. } => OrderMode::Chronological,
            Grouping::Field(_) | Grouping::Ungrouped => OrderMode::Label,
        }
    }
}

/// A row that can be placed by the ordering policy.
pub trait Ordered {
    /// Group label.
    fn label(&self) -> &str;
    /// First day of the bucket, when known.
    fn bucket_start(&self) -> Option<NaiveDate>;
}

impl Ordered for GroupResult {
    fn label(&self) -> &str {
        &self.group
    }

    fn bucket_start(&self) -> Option<NaiveDate> {
        self.bucket_start
    }
}

impl Ordered for MergedSeriesResult {
    fn label(&self) -> &str {
        &self.group
    }

    fn bucket_start(&self) -> Option<NaiveDate> {
        self.bucket_start
    }
}

/// Sort rows in place.
pub fn sort<T: Ordered>(rows: &mut [T], mode: OrderMode) {
    match mode {
        OrderMode::DayOfWeek => rows.sort_by_key(|r| weekday_rank(r.label())),
        OrderMode::Chronological => rows.sort_by(compare_chronological),
        OrderMode::Label => rows.sort_by(|a, b| a.label().cmp(b.label())),
    }
}

/// Weekdays first in calendar order, unknown labels next, `No Date` last.
fn weekday_rank(label: &str) -> usize {
    match WEEKDAYS.iter().position(|d| *d == label) {
        Some(i) => i,
        None if label == NO_DATE => WEEKDAYS.len() + 1,
        None => WEEKDAYS.len(),
    }
}

fn compare_chronological<T: Ordered>(a: &T, b: &T) -> Ordering {
    let sentinel = |r: &T| matches!(r.label(), UNKNOWN_BUCKET | INVALID_BUCKET);
    let start = |r: &T| r.bucket_start().or_else(|| parse_bucket_label(r.label()));

    sentinel(a)
        .cmp(&sentinel(b))
        .then_with(|| match (start(a), start(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Recover the first day of a bucket from its label.
///
/// Handles day, month, quarter and year labels; week labels carry no year
/// and rely on the stored bucket start instead.
pub fn parse_bucket_label(label: &str) -> Option<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(label, "%Y-%m-%d") {
        return Some(day);
    }
    let (year, rest) = label.split_once('-').unwrap_or((label, ""));
    if year.len() != 4 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month = match rest {
        "" => 1,
        q if q.starts_with('Q') => {
            let quarter = q[1..].parse::<u32>().ok().filter(|n| (1..=4).contains(n))?;
            (quarter - 1) * 3 + 1
        }
        m => m.parse().ok()?,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Overwrite each group's value with the running total of `count`.
///
/// Must run on already-ordered groups.
pub fn apply_cumulative(groups: &mut [GroupResult]) {
    let mut running = 0usize;
    for group in groups {
        running += group.count;
        let total = running as f64;
        group.value = total.into();
        group.cumulative_value = Some(total);
    }
}
