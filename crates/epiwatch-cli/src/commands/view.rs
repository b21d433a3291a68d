//! `view` command: the cross-sectional snapshot.

use serde_json::Value;

use epiwatch_core::AggregationService;

use crate::commands::rows_to_json;
use crate::error::CliError;

pub async fn run_view(
    service: &AggregationService,
    county: Option<&str>,
    date: Option<&str>,
    date_range: Option<(&str, &str)>,
) -> Result<Value, CliError> {
    let result = service
        .get_cross_sectional_view(county, date, date_range)
        .await?;
    Ok(rows_to_json(&result))
}
