//! # Epiwatch Warehouse
//!
//! `DuckDB`-based storage layer for the epiwatch analytics stack.
//!
//! ## Overview
//!
//! This crate owns the warehouse schema, the injection-safe query builder,
//! and the parameterized ingestion surface the external ETL job calls.
//!
//! ### Features
//!
//! - 🔒 **Secure SQL**: every caller-supplied value travels as a bound
//!   parameter; identifiers come from closed enumerations
//! - 📊 **Analytical views**: trend and cross-sectional views over the
//!   county dataset
//! - 🔄 **Connection pooling**: read-only and read-write handles pooled
//!   separately
//! - ⚡ **Query guardrails**: row limits and timeouts on every call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use epiwatch_warehouse::{
//!     FilterSet, QueryBuilder, QueryGuardrails, Table, Warehouse,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     let query = QueryBuilder::select_all(Table::CountyDemographics)
//!         .filters(&FilterSet::new().county("Alameda"))?
//!         .build();
//!     let result = warehouse.execute_select(&query, QueryGuardrails::default())?;
//!     println!("{} rows", result.row_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `daily_counts` | Per-county daily case/death counts and rates |
//! | `county_demographics` | 2020 census population counts and ratios |
//! | `cases_demographics` | Statewide counts by demographic group |
//! | `ingest_log` | Ingestion audit log |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_trend` | Daily per-county metric series |
//! | `vw_cases_demographics` | Counts joined with census ratios |

pub mod migrations;
pub mod pool;
pub mod query;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{params_from_iter, Connection, ToSql};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

pub use pool::{AccessMode, ConnectionPool, PooledConnection};
pub use query::{
    format_date, parse_date, BoundQuery, FilterError, FilterSet, Interval, Metric, QueryBuilder,
    SqlParam, Table,
};

/// Days between the julian epoch and 1970-01-01, for DATE column decoding.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for epiwatch data.
    pub epiwatch_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept per access mode.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let epiwatch_home = resolve_epiwatch_home();
        let db_path = epiwatch_home.join("warehouse.duckdb");
        Self {
            epiwatch_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Guardrails for query execution to prevent resource exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    /// Maximum number of rows to return.
    pub max_rows: usize,
    /// Query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "max_rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "query_timeout_ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Column metadata for query results.
#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    /// Column name.
    pub name: String,
    /// Column data type.
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Result of a query execution: ordered column names parallel to row data.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Column definitions.
    pub columns: Vec<SqlColumn>,
    /// Row data as JSON values.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned.
    pub row_count: usize,
    /// Whether results were truncated due to the `max_rows` limit.
    pub truncated: bool,
}

impl QueryResult {
    /// Position of a column by name, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// A single row zipped with its column names, preserving column order.
    #[must_use]
    pub fn record(&self, row: usize) -> Vec<(String, Value)> {
        self.rows
            .get(row)
            .map(|values| {
                self.columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| (column.name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A per-county daily observation for ingestion. Dates are ISO `YYYY-MM-DD`
/// strings cast server-side.
#[derive(Debug, Clone)]
pub struct DailyCountRecord {
    pub area: String,
    pub date: String,
    pub total_cases: Option<f64>,
    pub total_deaths: Option<f64>,
    pub cases_per_100k: Option<f64>,
    pub deaths_per_100k: Option<f64>,
    pub population: Option<i64>,
}

/// A county demographics row for ingestion (2020 census shape).
#[derive(Debug, Clone, Default)]
pub struct DemographicsRecord {
    pub county_name: String,
    pub fips: Option<String>,
    pub population: Option<i64>,
    pub male_population_ratio: Option<f64>,
    pub female_population_ratio: Option<f64>,
    pub w_population_ratio: Option<f64>,
    pub b_population_ratio: Option<f64>,
    pub o_population_ratio: Option<f64>,
    pub nh_population_ratio: Option<f64>,
    pub hi_population_ratio: Option<f64>,
    pub na_population_ratio: Option<f64>,
    pub age_0_19_population_ratio: Option<f64>,
    pub age_20_49_population_ratio: Option<f64>,
    pub age_50_64_population_ratio: Option<f64>,
    pub age_65_plus_population_ratio: Option<f64>,
}

/// A demographic-breakdown row for ingestion.
#[derive(Debug, Clone)]
pub struct CaseDemographicsRecord {
    pub report_date: String,
    pub demographic_category: String,
    pub demographic_value: String,
    pub total_cases: Option<f64>,
    pub total_deaths: Option<f64>,
}

/// The warehouse handle: schema management, guarded reads, ingestion.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    ///
    /// # Errors
    /// See [`Warehouse::open`].
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse, creating parent directories, tables, and views.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the schema
    /// fails to apply.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, pool };
        warehouse.initialize()?;
        info!("warehouse open at {}", warehouse.db_path().display());
        Ok(warehouse)
    }

    /// Apply migrations and (re)create views. Idempotent.
    ///
    /// # Errors
    /// Returns an error if schema or view SQL fails.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Root data directory this warehouse was opened under.
    #[must_use]
    pub fn home(&self) -> &Path {
        self.config.epiwatch_home.as_path()
    }

    /// Execute a built query read-only with its bound parameters.
    ///
    /// # Errors
    /// Returns `QueryTimeout` when the guardrail deadline passes between row
    /// fetches, or the underlying `DuckDB` error otherwise.
    pub fn execute_select(
        &self,
        query: &BoundQuery,
        guardrails: QueryGuardrails,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        debug!("select: {}", query.sql);

        let connection = self.pool.checkout(AccessMode::ReadOnly)?;
        let started = Instant::now();
        let mut statement = connection.prepare(&query.sql)?;

        // Execute once so column metadata is populated.
        let _ = statement.query(params_from_iter(query.params.iter()))?;
        let column_count = statement.column_count();
        let mut columns = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let name = statement.column_name(index)?.to_string();
            let dtype = statement.column_type(index);
            columns.push(SqlColumn {
                name,
                r#type: dtype.to_string(),
            });
        }

        let mut rows_cursor = statement.query(params_from_iter(query.params.iter()))?;
        let mut rows = Vec::new();
        let mut truncated = false;

        while let Some(row) = rows_cursor.next()? {
            ensure_timeout(started, guardrails.timeout())?;

            if rows.len() >= guardrails.max_rows {
                truncated = true;
                break;
            }

            rows.push(read_row(row, column_count)?);
        }

        ensure_timeout(started, guardrails.timeout())?;

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
            truncated,
        })
    }

    /// Execute raw SQL with guardrails, the operator escape hatch behind
    /// the CLI `sql` command.
    ///
    /// # Security
    /// Read-only mode accepts a single SELECT/CTE statement only. Write
    /// statements require `allow_write`.
    ///
    /// # Errors
    /// Returns `QueryRejected` for policy violations, `QueryTimeout` on
    /// deadline, or the underlying `DuckDB` error.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
        allow_write: bool,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;

        if !allow_write {
            enforce_read_only_query(sql)?;
        }

        if is_select_like(sql) {
            return self.execute_select(
                &BoundQuery {
                    sql: sql.to_string(),
                    params: Vec::new(),
                },
                guardrails,
            );
        }

        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        connection.execute_batch(sql)?;
        Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
        })
    }

    /// Ingest daily per-county counts using parameterized inserts.
    ///
    /// Runs inside a transaction: either every row lands or none do.
    ///
    /// # Errors
    /// Returns the underlying `DuckDB` error; the transaction is rolled
    /// back on failure.
    pub fn ingest_daily_counts(
        &self,
        request_id: &str,
        rows: &[DailyCountRecord],
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 7] = [
                    &row.area,
                    &row.date,
                    &row.total_cases,
                    &row.total_deaths,
                    &row.cases_per_100k,
                    &row.deaths_per_100k,
                    &row.population,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO daily_counts \
                     (area, date, total_cases, total_deaths, cases_per_100k, deaths_per_100k, population) \
                     VALUES (?, TRY_CAST(? AS DATE), ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            log_ingest(&connection, request_id, "daily_counts", rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Ingest county demographics using parameterized inserts.
    ///
    /// # Errors
    /// Returns the underlying `DuckDB` error; the transaction is rolled
    /// back on failure.
    pub fn ingest_demographics(
        &self,
        request_id: &str,
        rows: &[DemographicsRecord],
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 15] = [
                    &row.county_name,
                    &row.fips,
                    &row.population,
                    &row.male_population_ratio,
                    &row.female_population_ratio,
                    &row.w_population_ratio,
                    &row.b_population_ratio,
                    &row.o_population_ratio,
                    &row.nh_population_ratio,
                    &row.hi_population_ratio,
                    &row.na_population_ratio,
                    &row.age_0_19_population_ratio,
                    &row.age_20_49_population_ratio,
                    &row.age_50_64_population_ratio,
                    &row.age_65_plus_population_ratio,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO county_demographics \
                     (county_name, fips, population, male_population_ratio, female_population_ratio, \
                      w_population_ratio, b_population_ratio, o_population_ratio, nh_population_ratio, \
                      hi_population_ratio, na_population_ratio, age_0_19_population_ratio, \
                      age_20_49_population_ratio, age_50_64_population_ratio, age_65_plus_population_ratio) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            log_ingest(&connection, request_id, "county_demographics", rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Ingest demographic-breakdown rows using parameterized inserts.
    ///
    /// # Errors
    /// Returns the underlying `DuckDB` error; the transaction is rolled
    /// back on failure.
    pub fn ingest_case_demographics(
        &self,
        request_id: &str,
        rows: &[CaseDemographicsRecord],
    ) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 5] = [
                    &row.report_date,
                    &row.demographic_category,
                    &row.demographic_value,
                    &row.total_cases,
                    &row.total_deaths,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO cases_demographics \
                     (report_date, demographic_category, demographic_value, total_cases, total_deaths) \
                     VALUES (TRY_CAST(? AS DATE), ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            log_ingest(&connection, request_id, "cases_demographics", rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Bulk-load a CSV file into one of the ingestion tables by column name.
    ///
    /// The path comes from the operator's command line, not the request
    /// surface; it is escaped for the `read_csv_auto` call the same way
    /// internal file paths are.
    ///
    /// # Errors
    /// Returns the underlying `DuckDB` error if the file cannot be read or
    /// its columns do not match.
    pub fn load_csv(
        &self,
        request_id: &str,
        table: Table,
        path: &Path,
    ) -> Result<usize, WarehouseError> {
        let target = match table {
            Table::DailyCounts | Table::CountyDemographics | Table::CasesDemographics => {
                table.name()
            }
            Table::TrendView | Table::CrossSectionalView => {
                return Err(WarehouseError::QueryRejected(format!(
                    "cannot load into view '{}'",
                    table.name()
                )))
            }
        };

        let connection = self.pool.checkout(AccessMode::ReadWrite)?;
        let path_sql = escape_sql_string(&path.to_string_lossy().replace('\\', "/"));
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let loaded = connection.execute(
                &format!(
                    "INSERT OR REPLACE INTO {target} BY NAME SELECT * FROM read_csv_auto('{path_sql}')"
                ),
                [],
            )?;
            log_ingest(&connection, request_id, target, loaded)?;
            Ok(loaded)
        })();

        finalize_transaction(&connection, result)
    }
}

fn log_ingest(
    connection: &Connection,
    request_id: &str,
    dataset: &str,
    row_count: usize,
) -> Result<(), WarehouseError> {
    let row_count = i64::try_from(row_count).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 3] = [&request_id, &dataset, &row_count];
    connection.execute(
        "INSERT INTO ingest_log (request_id, dataset, row_count, status, timestamp) \
         VALUES (?, ?, ?, 'ok', CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Read a single row from the result set.
fn read_row(row: &duckdb::Row<'_>, column_count: usize) -> Result<Vec<Value>, duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_json_value(value));
    }
    Ok(output)
}

/// Convert a `DuckDB` value to a JSON value. Dates and timestamps come out
/// as ISO strings so downstream shaping can parse them uniformly.
fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Blob(value) => Value::String(hex::encode(value)),
        DuckValue::Date32(days) => {
            match Date::from_julian_day(days.saturating_add(UNIX_EPOCH_JULIAN_DAY)) {
                Ok(date) => Value::String(format_date(date)),
                Err(_) => Value::Null,
            }
        }
        DuckValue::Timestamp(unit, raw) => timestamp_to_json(unit, raw),
        other => Value::String(format!("{other:?}")),
    }
}

fn timestamp_to_json(unit: TimeUnit, raw: i64) -> Value {
    let nanos = match unit {
        TimeUnit::Second => i128::from(raw) * 1_000_000_000,
        TimeUnit::Millisecond => i128::from(raw) * 1_000_000,
        TimeUnit::Microsecond => i128::from(raw) * 1_000,
        TimeUnit::Nanosecond => i128::from(raw),
    };
    match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
        Ok(ts) => Value::String(ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())),
        Err(_) => Value::Null,
    }
}

/// Convert an f64 to a JSON number, returning Null for NaN/Inf.
fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Normalize a SQL query string.
fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

/// Enforce that a query is read-only (SELECT/CTE only).
fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "read-only mode accepts only SELECT/CTE queries; use --write for write statements",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed in read-only mode",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';')
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}

/// Ensure that the query has not exceeded the timeout.
fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

/// Resolve the epiwatch home directory from environment or default.
fn resolve_epiwatch_home() -> PathBuf {
    if let Some(path) = env::var_os("EPIWATCH_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".epiwatch");
    }

    PathBuf::from(".epiwatch")
}

/// Escape a string for safe inclusion in SQL.
///
/// Used only for operator-supplied file paths in `read_csv_auto` calls;
/// request-surface values always use parameterized queries instead.
fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Warehouse) {
        let temp = tempdir().expect("tempdir");
        let home = temp.path().join("epiwatch-home");
        let warehouse = Warehouse::open(WarehouseConfig {
            epiwatch_home: home.clone(),
            db_path: home.join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open");
        (temp, warehouse)
    }

    fn sample_counts() -> Vec<DailyCountRecord> {
        vec![
            DailyCountRecord {
                area: "Alameda".to_string(),
                date: "2022-01-01".to_string(),
                total_cases: Some(120.0),
                total_deaths: Some(2.0),
                cases_per_100k: Some(7.2),
                deaths_per_100k: Some(0.1),
                population: Some(1_680_000),
            },
            DailyCountRecord {
                area: "Alameda".to_string(),
                date: "2022-01-02".to_string(),
                total_cases: Some(140.0),
                total_deaths: Some(1.0),
                cases_per_100k: Some(8.4),
                deaths_per_100k: Some(0.05),
                population: Some(1_680_000),
            },
        ]
    }

    #[test]
    fn initializes_tables_and_views() {
        let (_temp, warehouse) = open_temp();

        let query = warehouse
            .execute_query(
                "SELECT COUNT(*) AS c FROM information_schema.tables WHERE table_name = 'daily_counts'",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(query.row_count, 1);

        let views = warehouse
            .execute_query(
                "SELECT COUNT(*) AS c FROM duckdb_views() WHERE view_name IN ('vw_trend', 'vw_cases_demographics')",
                QueryGuardrails::default(),
                false,
            )
            .expect("views query");
        assert_eq!(views.rows[0][0], Value::Number(Number::from(2)));
    }

    #[test]
    fn read_only_mode_rejects_write_query() {
        let (_temp, warehouse) = open_temp();

        let error = warehouse
            .execute_query(
                "CREATE TABLE test_write (id INTEGER)",
                QueryGuardrails::default(),
                false,
            )
            .expect_err("should reject");

        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn ingest_uses_parameterized_queries() {
        let (_temp, warehouse) = open_temp();

        // A county name that would break a string-built query
        let hostile = r#"Kern'; DROP TABLE daily_counts; --"#;
        let rows = vec![DailyCountRecord {
            area: hostile.to_string(),
            date: "2022-01-01".to_string(),
            total_cases: Some(5.0),
            total_deaths: None,
            cases_per_100k: None,
            deaths_per_100k: None,
            population: None,
        }];
        warehouse
            .ingest_daily_counts("req-001", &rows)
            .expect("ingest should succeed with parameterized queries");

        let query = QueryBuilder::select_all(Table::DailyCounts)
            .filters(&FilterSet::new().county(hostile))
            .expect("filters")
            .build();
        let result = warehouse
            .execute_select(&query, QueryGuardrails::default())
            .expect("select");

        assert_eq!(result.row_count, 1);
        let area = result.column_index("area").expect("area column");
        assert_eq!(result.rows[0][area], Value::String(hostile.to_string()));
    }

    #[test]
    fn date_columns_decode_as_iso_strings() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .ingest_daily_counts("req-002", &sample_counts())
            .expect("ingest");

        let query = QueryBuilder::select_all(Table::DailyCounts)
            .filters(&FilterSet::new().date(parse_date("2022-01-02").expect("date")))
            .expect("filters")
            .build();
        let result = warehouse
            .execute_select(&query, QueryGuardrails::default())
            .expect("select");

        assert_eq!(result.row_count, 1);
        let date = result.column_index("date").expect("date column");
        assert_eq!(result.rows[0][date], Value::String("2022-01-02".to_string()));
    }

    #[test]
    fn ingest_is_idempotent_per_primary_key() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .ingest_daily_counts("req-003", &sample_counts())
            .expect("first ingest");
        warehouse
            .ingest_daily_counts("req-004", &sample_counts())
            .expect("second ingest");

        let result = warehouse
            .execute_query(
                "SELECT COUNT(*) AS c FROM daily_counts",
                QueryGuardrails::default(),
                false,
            )
            .expect("count");
        assert_eq!(result.rows[0][0], Value::Number(Number::from(2)));
    }

    #[test]
    fn ingest_writes_audit_log() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .ingest_daily_counts("req-audit", &sample_counts())
            .expect("ingest");

        let result = warehouse
            .execute_query(
                "SELECT request_id, dataset, row_count, status FROM ingest_log WHERE request_id = 'req-audit'",
                QueryGuardrails::default(),
                false,
            )
            .expect("audit query");
        assert_eq!(result.row_count, 1);
        assert_eq!(
            result.rows[0][1],
            Value::String("daily_counts".to_string())
        );
    }

    #[test]
    fn cross_sectional_view_joins_demographics() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .ingest_daily_counts("req-005", &sample_counts())
            .expect("counts");
        warehouse
            .ingest_demographics(
                "req-006",
                &[DemographicsRecord {
                    county_name: "Alameda".to_string(),
                    population: Some(1_680_000),
                    male_population_ratio: Some(0.49),
                    female_population_ratio: Some(0.51),
                    ..DemographicsRecord::default()
                }],
            )
            .expect("demographics");

        let query = QueryBuilder::select_all(Table::CrossSectionalView)
            .filters(&FilterSet::new().county("Alameda"))
            .expect("filters")
            .build();
        let result = warehouse
            .execute_select(&query, QueryGuardrails::default())
            .expect("select");

        assert_eq!(result.row_count, 2);
        assert!(result.column_index("male_population_ratio").is_some());
    }

    #[test]
    fn guardrails_reject_zero_limits() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse
            .execute_query(
                "SELECT 1",
                QueryGuardrails {
                    max_rows: 0,
                    query_timeout_ms: 1000,
                },
                false,
            )
            .expect_err("zero max_rows should fail");
        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn row_limit_truncates_results() {
        let (_temp, warehouse) = open_temp();
        let rows: Vec<DailyCountRecord> = (1..=20)
            .map(|day| DailyCountRecord {
                area: "Fresno".to_string(),
                date: format!("2022-01-{day:02}"),
                total_cases: Some(f64::from(day)),
                total_deaths: None,
                cases_per_100k: None,
                deaths_per_100k: None,
                population: None,
            })
            .collect();
        warehouse
            .ingest_daily_counts("req-007", &rows)
            .expect("ingest");

        let result = warehouse
            .execute_query(
                "SELECT * FROM daily_counts",
                QueryGuardrails {
                    max_rows: 5,
                    query_timeout_ms: 5_000,
                },
                false,
            )
            .expect("query");
        assert_eq!(result.row_count, 5);
        assert!(result.truncated);
    }
}
