/// Forecast-vs-actual series merge.
///
/// Two independently aggregated series are joined on group label. Every
/// forecast group appears with `actual: 0` until an actual group with the same
/// label fills it in; actual-only groups are appended with `forecast: 0`.
/// The engine runs the two aggregation passes (see
/// [`AnalyticsEngine::compare_series`](crate::engine::AnalyticsEngine::compare_series)).
use crate::ordering::{self, OrderMode};
use crate::types::{GroupResult, MergedSeriesResult};
use std::collections::HashMap;

/// Merge two ordered series by group label.
pub fn merge(forecast: &[GroupResult], actual: &[GroupResult]) -> Vec<MergedSeriesResult> {
    let mut merged: Vec<MergedSeriesResult> = Vec::with_capacity(forecast.len() + actual.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for group in forecast {
        index.insert(&group.group, merged.len());
        merged.push(MergedSeriesResult {
            group: group.group.clone(),
            forecast: group.value.as_f64(),
            actual: 0.0,
            bucket_start: group.bucket_start,
        });
    }

    for group in actual {
        match index.get(group.group.as_str()) {
            Some(&i) => {
                merged[i].actual = group.value.as_f64();
                merged[i].bucket_start = merged[i].bucket_start.or(group.bucket_start);
            }
            None => {
                index.insert(&group.group, merged.len());
                merged.push(MergedSeriesResult {
                    group: group.group.clone(),
                    forecast: 0.0,
                    actual: group.value.as_f64(),
                    bucket_start: group.bucket_start,
                });
            }
        }
    }

    merged
}

/// Re-sort a merged series for weekday or calendar groupings.
///
/// Categorical merges keep forecast-then-actual order.
pub fn reorder(merged: &mut [MergedSeriesResult], mode: OrderMode) {
    if matches!(mode, OrderMode::DayOfWeek | OrderMode::Chronological) {
        ordering::sort(merged, mode);
    }
}
