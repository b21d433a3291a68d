//! `load` and `sql` commands: the operator surface.

use std::path::Path;

use serde_json::{json, to_value, Value};
use uuid::Uuid;

use epiwatch_warehouse::{QueryGuardrails, Table, Warehouse};

use crate::cli::LoadDataset;
use crate::error::CliError;

pub fn run_load(
    warehouse: &Warehouse,
    dataset: LoadDataset,
    file: &Path,
) -> Result<Value, CliError> {
    let table = match dataset {
        LoadDataset::DailyCounts => Table::DailyCounts,
        LoadDataset::CountyDemographics => Table::CountyDemographics,
        LoadDataset::CasesDemographics => Table::CasesDemographics,
    };

    let request_id = format!("load-{}", Uuid::new_v4());
    let loaded = warehouse.load_csv(&request_id, table, file)?;

    Ok(json!({
        "dataset": table.name(),
        "file": file.display().to_string(),
        "rows": loaded,
        "request_id": request_id,
        // Result caches hold exact-match entries with no expiry.
        "note": "restart long-running services so cached query results pick up the new data",
    }))
}

pub fn run_sql(
    warehouse: &Warehouse,
    query: &str,
    write: bool,
    max_rows: usize,
    timeout_ms: u64,
) -> Result<Value, CliError> {
    let result = warehouse.execute_query(
        query,
        QueryGuardrails {
            max_rows,
            query_timeout_ms: timeout_ms,
        },
        write,
    )?;
    Ok(to_value(&result)?)
}
