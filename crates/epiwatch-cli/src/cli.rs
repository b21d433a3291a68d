//! CLI argument definitions for epiwatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `counties` | List known county names |
//! | `summary` | County demographic summary |
//! | `trend` | Time-bucketed metric aggregates |
//! | `view` | Cross-sectional cases + demographics snapshot |
//! | `top` | Counties ranked by averaged metric |
//! | `demographics` | Statewide counts by demographic group |
//! | `forecast` | ARIMA(1,1,1) forecast for one county and metric |
//! | `cluster` | K-means clustering of counties |
//! | `load` | Bulk-load a CSV file into a warehouse table |
//! | `sql` | Run a guarded SQL query against the warehouse |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--home` | `$EPIWATCH_HOME` or `~/.epiwatch` | Data directory |

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// County-level COVID-19 analytics over a local DuckDB warehouse.
///
/// Query aggregated case, death, and census data; forecast county trends;
/// and cluster counties by epidemiological and demographic features.
#[derive(Debug, Parser)]
#[command(
    name = "epiwatch",
    author,
    version,
    about = "County-level epidemiological analytics CLI"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Override the data directory (defaults to $EPIWATCH_HOME or
    /// ~/.epiwatch).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Time bucketing for trend and forecast commands.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IntervalArg {
    Day,
    Month,
}

impl IntervalArg {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }
}

/// Warehouse tables that accept CSV loads.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LoadDataset {
    DailyCounts,
    CountyDemographics,
    CasesDemographics,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every county known to the entity directory.
    Counties,

    /// Demographic summary: one record with --county, else all counties.
    Summary {
        /// County name, e.g. "Los Angeles".
        #[arg(long)]
        county: Option<String>,
    },

    /// Time-bucketed metric aggregates, summed for counts and averaged for
    /// per-capita rates.
    Trend {
        #[arg(long)]
        county: Option<String>,

        /// Metric name: cases, deaths, cases_per_100k, deaths_per_100k.
        /// Omit for all four.
        #[arg(long)]
        metric: Option<String>,

        #[arg(long, value_enum, default_value_t = IntervalArg::Day)]
        interval: IntervalArg,
    },

    /// Cross-sectional snapshot joining counts with census ratios.
    View {
        #[arg(long)]
        county: Option<String>,

        /// Exact date (YYYY-MM-DD); mutually exclusive with the range.
        #[arg(long)]
        date: Option<String>,

        /// Inclusive range start (YYYY-MM-DD); requires --end-date.
        #[arg(long, requires = "end_date")]
        start_date: Option<String>,

        /// Inclusive range end (YYYY-MM-DD); requires --start-date.
        #[arg(long, requires = "start_date")]
        end_date: Option<String>,
    },

    /// Counties ranked descending by the averaged metric.
    Top {
        /// Metric name: cases, deaths, cases_per_100k, deaths_per_100k.
        #[arg(long)]
        metric: String,

        #[arg(long, requires = "end_date")]
        start_date: Option<String>,

        #[arg(long, requires = "start_date")]
        end_date: Option<String>,

        /// Number of counties to return.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Statewide counts broken down by demographic group.
    Demographics {
        /// Demographic category, e.g. "Age Group".
        #[arg(long)]
        category: Option<String>,

        /// Report date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
    },

    /// Fit ARIMA(1,1,1) to a county's trend and forecast ahead.
    Forecast {
        #[arg(long)]
        county: String,

        /// Metric name: cases, deaths, cases_per_100k, deaths_per_100k.
        #[arg(long)]
        metric: String,

        #[arg(long, value_enum, default_value_t = IntervalArg::Day)]
        interval: IntervalArg,

        /// Number of periods to forecast.
        #[arg(long, default_value_t = 14, value_parser = clap::value_parser!(u16).range(1..=60))]
        horizon: u16,
    },

    /// Cluster counties over standardized features with seeded k-means.
    Cluster {
        /// Comma-separated feature columns from the cross-sectional view.
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "cases_per_100k,deaths_per_100k"
        )]
        features: Vec<String>,

        /// Number of clusters.
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..=10))]
        k: u16,

        /// Seed for reproducible initialization.
        #[arg(long, default_value_t = epiwatch_analytics::DEFAULT_SEED)]
        seed: u64,

        /// Snapshot date (YYYY-MM-DD); defaults to every date on record.
        #[arg(long)]
        date: Option<String>,
    },

    /// Bulk-load a CSV file (matched by column name) into a table.
    Load {
        #[arg(long, value_enum)]
        dataset: LoadDataset,

        /// Path to the CSV file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Run a guarded SQL query; SELECT-only unless --write is given.
    Sql {
        /// The SQL text to execute.
        query: String,

        /// Allow write statements.
        #[arg(long, default_value_t = false)]
        write: bool,

        /// Maximum rows to return.
        #[arg(long, default_value_t = 1000)]
        max_rows: usize,

        /// Query timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}
