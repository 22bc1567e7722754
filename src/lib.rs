//! # KoruAnalytics: Chart-Ready Aggregation
//!
//! **Tagline:** *"Filter. Bucket. Reduce."*
//!
//! KoruAnalytics turns a collection of work-item records (tasks, tickets,
//! time entries, each a loosely-typed JSON object) into the series a
//! dashboard chart consumes:
//! - **Filtering** - Flat condition lists or structured dashboard filters
//! - **Derived fields** - Named formulas and free-form arithmetic
//! - **Grouping** - By field, by weekday, or by calendar bucket
//! - **Aggregation** - Count, sum, avg, min, max, median, range, distinct,
//!   percentage, progress and cumulative count
//! - **Series comparison** - Forecast vs. actual on two date fields
//!
//! ## Quick Start
//!
//! ```ignore
//! use koru_analytics::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let records = vec![
//!         json!({"status": "open", "points": 3, "date_created": "2024-01-15"}),
//!         json!({"status": {"status": "closed"}, "points": 5, "date_created": "2024-02-02"}),
//!     ];
//!
//!     let engine = AnalyticsEngine::new();
//!     let config = AggregationConfig::new(AggregationType::Sum)
//!         .field("points")
//!         .time_group_by(TimeGranularity::Month);
//!
//!     let output = engine.aggregate(&records, &config)?;
//!     println!("{}", output.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! Every invocation runs the same stages, in order:
//!
//! 1. **Filter** (`filter`, `predicate`, `date_range`) - Drop records
//! 2. **Derive** (`calculated`, `formula`) - Add calculated fields
//! 3. **Group** (`grouping`) - Assign each record one group key
//! 4. **Reduce** (`aggregate`) - One value per group
//! 5. **Order** (`ordering`) - Weekday, chronological or label order,
//!    then the running total for `cumulative_count`
//!
//! [`AnalyticsEngine::compare_series`] runs the pipeline twice and joins the
//! results (`series`).
//!
//! ## Thread Safety
//!
//! The engine holds no mutable state. Inputs are borrowed, outputs are
//! freshly allocated, and a shared `&AnalyticsEngine` can serve any number
//! of threads.

// Internal modules
mod error;
mod types;

// Pipeline stages
pub mod aggregate;
pub mod calculated;
pub mod config;
pub mod date_range;
pub mod engine;
pub mod fields;
pub mod filter;
pub mod formula;
pub mod grouping;
pub mod ordering;
pub mod predicate;
pub mod series;

// Public API exports
pub use config::{
    AggregationConfig, AggregationType, CalculatedField, Condition, DAY_OF_WEEK, DateRangeSpec,
    EngineOptions, FilterSpec, StructuredFilters, TimeGranularity, UnknownOperatorPolicy,
};
pub use engine::AnalyticsEngine;
pub use error::{AnalyticsError, AnalyticsResult, ConfigError};
pub use types::{
    AggregationOutput, AggregationValue, GroupResult, MergedSeriesResult, Progress, ScalarResult,
};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{Value as JsonValue, json};

/// Prelude module for convenient imports.
///
/// Import everything you need with:
/// ```ignore
/// use koru_analytics::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{
        AggregationConfig, AggregationType, Condition, EngineOptions, FilterSpec,
        StructuredFilters, TimeGranularity,
    };
    pub use crate::engine::AnalyticsEngine;
    pub use crate::error::{AnalyticsError, AnalyticsResult};
    pub use crate::types::{AggregationOutput, AggregationValue, GroupResult, MergedSeriesResult};
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{Value as JsonValue, json};
}
