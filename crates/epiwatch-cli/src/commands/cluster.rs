//! `cluster` command: seeded k-means over standardized county features.

use serde_json::{json, Value};

use epiwatch_analytics::cluster_counties;
use epiwatch_core::AggregationService;

use crate::error::CliError;

pub async fn run_cluster(
    service: &AggregationService,
    features: &[String],
    k: usize,
    seed: u64,
    date: Option<&str>,
) -> Result<Value, CliError> {
    let table = service.feature_table(features, date, None).await?;
    let result = cluster_counties(&table, k, seed)?;

    // The standardized values of the first two features back a 2-D
    // projection on the dashboard side.
    let counties: Vec<Value> = result
        .assignments
        .iter()
        .zip(&result.standardized)
        .map(|(assignment, values)| {
            json!({
                "county": assignment.entity,
                "cluster": assignment.cluster,
                "x": values.first().copied(),
                "y": values.get(1).copied(),
            })
        })
        .collect();

    Ok(json!({
        "k": result.k,
        "seed": seed,
        "features": result.features,
        "counties": counties,
    }))
}
