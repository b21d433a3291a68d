//! Command dispatch and shared result shaping.

mod cluster;
mod forecast;
mod load;
mod summary;
mod trend;
mod view;

use serde_json::{Map, Value};

use epiwatch_core::{
    AggregationService, QueryResult, Record, Warehouse, WarehouseConfig,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Execute the parsed command and return its JSON result.
pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let mut config = WarehouseConfig::default();
    if let Some(home) = &cli.home {
        config.epiwatch_home = home.clone();
        config.db_path = home.join("warehouse.duckdb");
    }
    let warehouse = Warehouse::open(config)?;

    match &cli.command {
        Command::Load { dataset, file } => load::run_load(&warehouse, *dataset, file),
        Command::Sql {
            query,
            write,
            max_rows,
            timeout_ms,
        } => load::run_sql(&warehouse, query, *write, *max_rows, *timeout_ms),
        command => {
            let service = AggregationService::with_defaults(warehouse);
            match command {
                Command::Counties => summary::run_counties(&service).await,
                Command::Summary { county } => {
                    summary::run_summary(&service, county.as_deref()).await
                }
                Command::Demographics { category, date } => {
                    summary::run_demographics(&service, category.as_deref(), date.as_deref()).await
                }
                Command::Trend {
                    county,
                    metric,
                    interval,
                } => {
                    trend::run_trend(&service, county.as_deref(), metric.as_deref(), *interval)
                        .await
                }
                Command::Top {
                    metric,
                    start_date,
                    end_date,
                    limit,
                } => {
                    trend::run_top(
                        &service,
                        metric,
                        range_of(start_date.as_deref(), end_date.as_deref()),
                        *limit,
                    )
                    .await
                }
                Command::View {
                    county,
                    date,
                    start_date,
                    end_date,
                } => {
                    view::run_view(
                        &service,
                        county.as_deref(),
                        date.as_deref(),
                        range_of(start_date.as_deref(), end_date.as_deref()),
                    )
                    .await
                }
                Command::Forecast {
                    county,
                    metric,
                    interval,
                    horizon,
                } => forecast::run_forecast(&service, county, metric, *interval, *horizon).await,
                Command::Cluster {
                    features,
                    k,
                    seed,
                    date,
                } => {
                    cluster::run_cluster(&service, features, *k as usize, *seed, date.as_deref())
                        .await
                }
                Command::Load { .. } | Command::Sql { .. } => unreachable!("handled above"),
            }
        }
    }
}

fn range_of<'a>(start: Option<&'a str>, end: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match (start, end) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    }
}

/// A result set as an array of `{column: value}` objects.
pub fn rows_to_json(result: &QueryResult) -> Value {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = result
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), value.clone()))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

/// A single record as a `{column: value}` object.
pub fn record_to_json(record: &Record) -> Value {
    let object: Map<String, Value> = record
        .iter()
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();
    Value::Object(object)
}
