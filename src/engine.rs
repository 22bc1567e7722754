/// The aggregation pipeline.
///
/// [`AnalyticsEngine`] ties the stages together:
///
/// ```text
/// filter -> calculated fields -> grouping -> reduce -> order -> (cumulative)
/// ```
///
/// The engine holds only its [`EngineOptions`]; every call reads its own
/// inputs and allocates its own outputs, so one engine can be shared freely
/// across threads.
///
/// # Example
///
/// ```ignore
/// use koru_analytics::{AnalyticsEngine, AggregationConfig, AggregationType, json};
///
/// let engine = AnalyticsEngine::new();
/// let records = vec![json!({"status": "open"}), json!({"status": "closed"})];
/// let config = AggregationConfig::new(AggregationType::Count).group_by("status");
/// let output = engine.aggregate(&records, &config)?;
/// ```
use crate::aggregate;
use crate::calculated;
use crate::config::{AggregationConfig, AggregationType, EngineOptions};
use crate::error::AnalyticsResult;
use crate::fields::get_present;
use crate::filter;
use crate::grouping::{self, Grouping};
use crate::ordering::{self, OrderMode};
use crate::series;
use crate::types::{AggregationOutput, GroupResult, ScalarResult};
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use std::borrow::Cow;

/// Stateless aggregation engine.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    options: EngineOptions,
}

impl AnalyticsEngine {
    /// Create an engine with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom options.
    pub fn with_options(options: EngineOptions) -> Self {
        Self { options }
    }

    /// The engine's options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Options with "now" fixed for the duration of one call.
    fn pinned_options(&self) -> EngineOptions {
        let mut options = self.options.clone();
        if options.reference_time.is_none() {
            options.reference_time = Some(chrono::Utc::now());
        }
        options
    }

    /// Run the full pipeline.
    ///
    /// Ungrouped configurations produce a single `[{value}]` row; grouped ones
    /// produce ordered [`GroupResult`]s.
    pub fn aggregate(
        &self,
        records: &[JsonValue],
        config: &AggregationConfig,
    ) -> AnalyticsResult<AggregationOutput> {
        config.validate()?;
        let options = self.pinned_options();
        let grouping = Grouping::from_config(config);

        tracing::debug!(
            source = config.source_data.as_deref().unwrap_or("-"),
            aggregation = config.aggregation_type.as_str(),
            records = records.len(),
            "aggregating"
        );

        if grouping == Grouping::Ungrouped {
            let derived = self.prepare(records.iter(), config, &options)?;
            let rows: Vec<&JsonValue> = derived.iter().map(|r| &**r).collect();
            let value = aggregate::reduce(&rows, config.aggregation_type, config.field_name());
            return Ok(AggregationOutput::Scalar(vec![ScalarResult { value }]));
        }

        let groups = self.grouped(records.iter(), config, &grouping, &options)?;
        Ok(AggregationOutput::Grouped(groups))
    }

    /// Run the pipeline and return group results, treating an ungrouped
    /// configuration as a single `all` group.
    pub fn aggregate_groups(
        &self,
        records: &[JsonValue],
        config: &AggregationConfig,
    ) -> AnalyticsResult<Vec<GroupResult>> {
        config.validate()?;
        let options = self.pinned_options();
        self.grouped(records.iter(), config, &Grouping::from_config(config), &options)
    }

    /// Compare a forecast series, keyed by `comparison_field`, with an actual
    /// series, keyed by `primary_field`.
    ///
    /// Each series only sees records carrying its date field and runs the full
    /// pipeline with that field as the grouping date. The result is always
    /// [`AggregationOutput::Merged`].
    pub fn compare_series(
        &self,
        records: &[JsonValue],
        comparison_field: &str,
        primary_field: &str,
        config: &AggregationConfig,
    ) -> AnalyticsResult<AggregationOutput> {
        config.validate()?;
        let options = self.pinned_options();

        let forecast = self.series_pass(records, comparison_field, config, &options)?;
        let actual = self.series_pass(records, primary_field, config, &options)?;
        tracing::debug!(
            forecast_groups = forecast.len(),
            actual_groups = actual.len(),
            "merging series"
        );

        let mut merged = series::merge(&forecast, &actual);
        series::reorder(&mut merged, OrderMode::for_grouping(&Grouping::from_config(config)));
        Ok(AggregationOutput::Merged(merged))
    }

    fn series_pass(
        &self,
        records: &[JsonValue],
        date_field: &str,
        config: &AggregationConfig,
        options: &EngineOptions,
    ) -> AnalyticsResult<Vec<GroupResult>> {
        let pass = config.clone().date_field(date_field);
        let subset = records.iter().filter(|r| get_present(r, date_field).is_some());
        self.grouped(subset, &pass, &Grouping::from_config(&pass), options)
    }

    /// Filter and derive.
    fn prepare<'a, I>(
        &self,
        records: I,
        config: &AggregationConfig,
        options: &EngineOptions,
    ) -> AnalyticsResult<Vec<Cow<'a, JsonValue>>>
    where
        I: IntoIterator<Item = &'a JsonValue>,
    {
        let filtered = filter::apply(records, config.filters.as_ref(), options)?;
        Ok(calculated::apply(filtered, &config.calculated_fields, &options.now()))
    }

    fn grouped<'a, I>(
        &self,
        records: I,
        config: &AggregationConfig,
        grouping: &Grouping,
        options: &EngineOptions,
    ) -> AnalyticsResult<Vec<GroupResult>>
    where
        I: IntoIterator<Item = &'a JsonValue>,
    {
        let derived = self.prepare(records, config, options)?;
        let offset = options.offset();
        let partitions = grouping::partition(derived.iter().map(|r| &**r), grouping, &offset);

        let mut groups: Vec<GroupResult> = partitions
            .into_iter()
            .map(|(key, members)| {
                let value =
                    aggregate::reduce(&members, config.aggregation_type, config.field_name());
                GroupResult::new(key.label, value, members.len())
                    .with_bucket_start(key.bucket_start)
            })
            .collect();

        ordering::sort(&mut groups, OrderMode::for_grouping(grouping));
        if config.aggregation_type == AggregationType::CumulativeCount {
            ordering::apply_cumulative(&mut groups);
        }

        tracing::debug!(
            records = derived.len(),
            groups = groups.len(),
            "grouped aggregation complete"
        );
        Ok(groups)
    }

    /// A deterministic key identifying one invocation's inputs, for external
    /// result caches.
    ///
    /// Covers the configuration, the options and the records. An engine
    /// without a pinned reference time hashes `null` for it, so callers that
    /// depend on relative dates should pin one or bound the cache lifetime.
    pub fn cache_key(
        &self,
        records: &[JsonValue],
        config: &AggregationConfig,
    ) -> AnalyticsResult<String> {
        let payload = json!({
            "config": config,
            "options": &self.options,
            "records": records,
        });
        let bytes = serde_json::to_vec(&payload)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
