//! Database views for analytical queries.

use duckdb::Connection;

/// Create database views for the aggregation operations.
///
/// Creates the following views:
/// - `vw_trend`: per-county daily metric series for time-bucketed aggregates
/// - `vw_cases_demographics`: daily counts joined with census population
///   ratios, one row per county and date
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_trend AS
SELECT
    area,
    date,
    total_cases,
    total_deaths,
    cases_per_100k,
    deaths_per_100k
FROM daily_counts;

CREATE OR REPLACE VIEW vw_cases_demographics AS
SELECT
    c.area,
    c.date,
    c.total_cases,
    c.total_deaths,
    c.cases_per_100k,
    c.deaths_per_100k,
    d.population,
    d.male_population_ratio,
    d.female_population_ratio,
    d.w_population_ratio,
    d.b_population_ratio,
    d.o_population_ratio,
    d.nh_population_ratio,
    d.hi_population_ratio,
    d.na_population_ratio,
    d.age_0_19_population_ratio,
    d.age_20_49_population_ratio,
    d.age_50_64_population_ratio,
    d.age_65_plus_population_ratio
FROM daily_counts c
JOIN county_demographics d ON c.area = d.county_name;
",
    )?;

    Ok(())
}
