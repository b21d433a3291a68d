//! Warehouse schema migrations.

use duckdb::Connection;

/// Create the warehouse tables if they do not exist.
///
/// Tables:
/// - `daily_counts`: per-county daily case/death counts and per-capita rates
/// - `county_demographics`: 2020 census population counts and ratios
/// - `cases_demographics`: statewide counts broken down by demographic group
/// - `ingest_log`: audit trail of ingestion batches
///
/// # Errors
/// Returns an error if the schema SQL fails to execute.
pub fn apply_migrations(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch(
        r"
CREATE TABLE IF NOT EXISTS daily_counts (
    area            VARCHAR NOT NULL,
    date            DATE NOT NULL,
    total_cases     DOUBLE,
    total_deaths    DOUBLE,
    cases_per_100k  DOUBLE,
    deaths_per_100k DOUBLE,
    population      BIGINT,
    PRIMARY KEY (area, date)
);

CREATE TABLE IF NOT EXISTS county_demographics (
    county_name                  VARCHAR NOT NULL PRIMARY KEY,
    fips                         VARCHAR,
    population                   BIGINT,
    male_population_ratio        DOUBLE,
    female_population_ratio      DOUBLE,
    w_population_ratio           DOUBLE,
    b_population_ratio           DOUBLE,
    o_population_ratio           DOUBLE,
    nh_population_ratio          DOUBLE,
    hi_population_ratio          DOUBLE,
    na_population_ratio          DOUBLE,
    age_0_19_population_ratio    DOUBLE,
    age_20_49_population_ratio   DOUBLE,
    age_50_64_population_ratio   DOUBLE,
    age_65_plus_population_ratio DOUBLE
);

CREATE TABLE IF NOT EXISTS cases_demographics (
    report_date          DATE NOT NULL,
    demographic_category VARCHAR NOT NULL,
    demographic_value    VARCHAR NOT NULL,
    total_cases          DOUBLE,
    total_deaths         DOUBLE,
    PRIMARY KEY (report_date, demographic_category, demographic_value)
);

CREATE TABLE IF NOT EXISTS ingest_log (
    request_id VARCHAR NOT NULL,
    dataset    VARCHAR NOT NULL,
    row_count  BIGINT NOT NULL,
    status     VARCHAR NOT NULL,
    timestamp  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
",
    )?;

    Ok(())
}
