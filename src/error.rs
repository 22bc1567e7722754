/// Error types for KoruAnalytics operations.
///
/// The engine degrades locally on bad records (a missing field contributes
/// `0` or `null`, an unparseable date lands in a sentinel group), so the only
/// failures surfaced to callers are configuration-shape problems. These are
/// grouped under a single variant so a caller can tell "fix your widget
/// config" apart from "the chart is legitimately empty".
use thiserror::Error;

/// The main error type for KoruAnalytics operations.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// The aggregation configuration is malformed or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// Serialization error when converting results to/from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    /// Whether the caller should correct its input and retry.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, AnalyticsError::InvalidConfiguration(_))
    }
}

/// Specific configuration-shape failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric aggregation was requested without a source field
    #[error("aggregation '{aggregation}' requires a 'field'")]
    MissingField {
        /// The aggregation type that needs a field
        aggregation: String,
    },

    /// A filter condition names an operator the engine does not know
    #[error("unknown filter operator '{operator}' on field '{field}'")]
    UnknownOperator {
        /// The offending operator
        operator: String,
        /// The field the condition was applied to
        field: String,
    },

    /// A `dateRange` token could not be resolved to a window
    #[error("unknown date range '{token}'")]
    UnknownDateRange {
        /// The offending token
        token: String,
    },

    /// A `weekdays` filter entry is not a weekday name or abbreviation
    #[error("unknown weekday '{value}'")]
    UnknownWeekday {
        /// The offending entry
        value: String,
    },

    /// An explicit `{start, end}` date range has an unparseable bound
    #[error("invalid date range bound '{value}'")]
    InvalidDateBound {
        /// The raw bound value
        value: String,
    },

    /// A `between` condition did not carry a two-element bound
    #[error("operator 'between' on field '{field}' needs a [low, high] pair")]
    InvalidBetween {
        /// The field the condition was applied to
        field: String,
    },

    /// The configuration JSON did not decode
    #[error("{reason}")]
    Malformed {
        /// Decoder message
        reason: String,
    },
}

/// Result type alias for KoruAnalytics operations.
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
