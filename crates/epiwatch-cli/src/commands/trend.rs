//! `trend` and `top` commands.

use serde_json::Value;

use epiwatch_core::AggregationService;

use crate::cli::IntervalArg;
use crate::commands::rows_to_json;
use crate::error::CliError;

pub async fn run_trend(
    service: &AggregationService,
    county: Option<&str>,
    metric: Option<&str>,
    interval: IntervalArg,
) -> Result<Value, CliError> {
    let result = service.get_trend(county, metric, interval.name()).await?;
    Ok(rows_to_json(&result))
}

pub async fn run_top(
    service: &AggregationService,
    metric: &str,
    date_range: Option<(&str, &str)>,
    limit: i64,
) -> Result<Value, CliError> {
    let result = service.get_top_n_by_metric(metric, date_range, limit).await?;
    Ok(rows_to_json(&result))
}
