use chrono::{Duration as Days, NaiveDate, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use koru_analytics::{
    AggregationConfig, AggregationType, AnalyticsEngine, Condition, DAY_OF_WEEK, EngineOptions,
    FilterSpec, JsonValue, TimeGranularity,
};
use serde_json::json;
use std::time::Duration;

const STATUSES: [&str; 4] = ["open", "in progress", "review", "closed"];

/// Deterministic task-like records spread over two years.
fn dataset(size: usize) -> Vec<JsonValue> {
    let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    (0..size)
        .map(|i| {
            let created = base + Days::days((i * 7 % 730) as i64);
            let done = (i % 3 == 0).then(|| (created + Days::days((i % 20) as i64)).to_string());
            json!({
                "id": i,
                "status": {"status": STATUSES[i % STATUSES.len()]},
                "priority": if i % 2 == 0 { "high" } else { "low" },
                "points": (i % 13) as f64,
                "date_created": created.to_string(),
                "date_done": done,
                "due_date": (created + Days::days(14)).to_string(),
            })
        })
        .collect()
}

fn engine() -> AnalyticsEngine {
    AnalyticsEngine::with_options(
        EngineOptions::new().reference_time(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
    )
}

/// Benchmark: Monthly sum with a condition filter
fn bench_time_bucketed(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_bucketed_sum");
    let engine = engine();
    let config = AggregationConfig::new(AggregationType::Sum)
        .field("points")
        .time_group_by(TimeGranularity::Month)
        .filters(FilterSpec::Conditions(vec![Condition::new("priority", "equals", "high")]));

    for size in [100, 1_000, 10_000] {
        let records = dataset(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(engine.aggregate(records, &config).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark: Median by status with a calculated field
fn bench_median_with_formula(c: &mut Criterion) {
    let engine = engine();
    let records = dataset(5_000);
    let config = AggregationConfig::new(AggregationType::Median)
        .field("weighted")
        .group_by("status")
        .calculated_field("weighted", "points * 1.5 + 2");

    c.bench_function("median_with_formula", |b| {
        b.iter(|| black_box(engine.aggregate(&records, &config).unwrap()))
    });
}

/// Benchmark: Forecast vs. actual by weekday
fn bench_compare_series(c: &mut Criterion) {
    let engine = engine();
    let records = dataset(5_000);
    let config = AggregationConfig::new(AggregationType::Count).group_by(DAY_OF_WEEK);

    c.bench_function("compare_series_weekday", |b| {
        b.iter(|| {
            black_box(
                engine
                    .compare_series(&records, "due_date", "date_done", &config)
                    .unwrap(),
            )
        })
    });
}

fn configure_criterion() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3))
        .sample_size(50)
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_time_bucketed,
        bench_median_with_formula,
        bench_compare_series
}

criterion_main!(benches);
