//! `counties`, `summary`, and `demographics` commands.

use serde_json::{json, Value};

use epiwatch_core::{AggregationService, SummaryLookup};

use crate::commands::{record_to_json, rows_to_json};
use crate::error::CliError;

pub async fn run_counties(service: &AggregationService) -> Result<Value, CliError> {
    let counties = service.county_names().await?;
    Ok(json!({ "counties": counties }))
}

pub async fn run_summary(
    service: &AggregationService,
    county: Option<&str>,
) -> Result<Value, CliError> {
    let value = match service.get_county_summary(county).await? {
        SummaryLookup::Found(record) => record_to_json(&record),
        SummaryLookup::FoundMany(result) => rows_to_json(&result),
    };
    Ok(value)
}

pub async fn run_demographics(
    service: &AggregationService,
    category: Option<&str>,
    date: Option<&str>,
) -> Result<Value, CliError> {
    let result = service.get_cases_demographics(category, date).await?;
    Ok(rows_to_json(&result))
}
