/// KoruAnalytics CLI - aggregate JSON record files from the command line
///
/// Usage:
///   kanalytics aggregate <records.json> -c <config.json>              - Run an aggregation
///   kanalytics compare <records.json> -c <config.json> --forecast F --actual A
///                                                                     - Forecast vs. actual
///   kanalytics formula '<formula>' -r '<record json>'                 - Evaluate one formula
///   kanalytics cache-key <records.json> -c <config.json>              - Print the cache key
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use koru_analytics::calculated;
use koru_analytics::{
    AggregationConfig, AnalyticsEngine, EngineOptions, JsonValue, UnknownOperatorPolicy,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// KoruAnalytics - chart-ready aggregation over JSON records
///
/// Filters, derives, groups, reduces and orders record collections.
#[derive(Parser)]
#[command(name = "kanalytics")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Instant treated as "now" (RFC 3339, default: wall clock)
    #[arg(long, global = true)]
    now: Option<String>,

    /// Calendar offset in minutes east of UTC
    #[arg(long, global = true, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset: i32,

    /// Treat unknown filter operators as always-true instead of failing
    #[arg(long, global = true)]
    allow_unknown_operators: bool,

    /// Log pipeline stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an aggregation over a records file
    ///
    /// Examples:
    ///   kanalytics aggregate tasks.json -c by_status.json
    ///   kanalytics aggregate tasks.json -c weekly.json --now 2024-03-15T00:00:00Z
    Aggregate {
        /// JSON file holding an array of records
        records: PathBuf,

        /// JSON file holding the aggregation configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Compare a forecast series with an actual series
    ///
    /// Example:
    ///   kanalytics compare tasks.json -c weekly.json --forecast due_date --actual date_done
    Compare {
        /// JSON file holding an array of records
        records: PathBuf,

        /// JSON file holding the aggregation configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Date field of the forecast series
        #[arg(long, default_value = "due_date")]
        forecast: String,

        /// Date field of the actual series
        #[arg(long, default_value = "date_done")]
        actual: String,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Evaluate a named or free-form formula against one record
    ///
    /// Examples:
    ///   kanalytics formula 'points * 2' -r '{"points": 4}'
    ///   kanalytics formula task_age -r '{"date_created": "2024-01-01"}'
    Formula {
        /// Formula text
        formula: String,

        /// Record as inline JSON
        #[arg(short, long)]
        record: String,
    },

    /// Print the cache key for a records file and configuration
    #[command(name = "cache-key")]
    CacheKey {
        /// JSON file holding an array of records
        records: PathBuf,

        /// JSON file holding the aggregation configuration
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = engine_options(&cli)?;
    let engine = AnalyticsEngine::with_options(options);

    match cli.command {
        Commands::Aggregate {
            records,
            config,
            compact,
        } => {
            let records = load_records(&records)?;
            let config = load_config(&config)?;
            let output = engine
                .aggregate(&records, &config)
                .context("Aggregation failed")?;
            print_json(&output.to_json()?, compact);
        }

        Commands::Compare {
            records,
            config,
            forecast,
            actual,
            compact,
        } => {
            let records = load_records(&records)?;
            let config = load_config(&config)?;
            let output = engine
                .compare_series(&records, &forecast, &actual, &config)
                .context("Series comparison failed")?;
            print_json(&output.to_json()?, compact);
        }

        Commands::Formula { formula, record } => {
            let record: JsonValue = serde_json::from_str(&record)
                .with_context(|| format!("Invalid JSON record: {}", record))?;
            let value = calculated::evaluate(&formula, &record, &engine.options().now());
            if value.is_null() {
                eprintln!("{}", "Formula could not be computed for this record".yellow());
            }
            println!("{}", value);
        }

        Commands::CacheKey { records, config } => {
            let records = load_records(&records)?;
            let config = load_config(&config)?;
            println!("{}", engine.cache_key(&records, &config)?);
        }
    }

    Ok(())
}

/// Install the stderr subscriber; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn engine_options(cli: &Cli) -> Result<EngineOptions> {
    let mut options = EngineOptions::new().utc_offset_minutes(cli.utc_offset);
    if let Some(now) = &cli.now {
        let at = DateTime::parse_from_rfc3339(now)
            .with_context(|| format!("Invalid --now timestamp: {}", now))?;
        options = options.reference_time(at.with_timezone(&Utc));
    }
    if cli.allow_unknown_operators {
        options = options.unknown_operator(UnknownOperatorPolicy::Pass);
    }
    Ok(options)
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Load a records file: a JSON array, or an object with a `records` array.
fn load_records(path: &Path) -> Result<Vec<JsonValue>> {
    match read_json(path)? {
        JsonValue::Array(records) => Ok(records),
        JsonValue::Object(mut map) => match map.remove("records") {
            Some(JsonValue::Array(records)) => Ok(records),
            _ => anyhow::bail!("{} has no \"records\" array", path.display()),
        },
        _ => anyhow::bail!("{} must hold a JSON array of records", path.display()),
    }
}

fn load_config(path: &Path) -> Result<AggregationConfig> {
    let value = read_json(path)?;
    AggregationConfig::from_json(&value)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn print_json(value: &JsonValue, compact: bool) {
    let text = if compact {
        value.to_string()
    } else {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    };
    println!("{}", text);
}
