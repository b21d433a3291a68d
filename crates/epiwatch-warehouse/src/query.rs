//! Parameterized query construction over the fixed warehouse views.
//!
//! Every value that originates outside the process (county names, dates,
//! categories, limits) is carried as a bound parameter; the query text only
//! ever contains table, column, and function names drawn from the closed
//! enumerations in this module. The built [`BoundQuery`] doubles as the
//! cache signature: two filter sets that produce the same text and the same
//! parameter tuple are guaranteed to read the same data.

use std::fmt::Write as _;
use std::sync::OnceLock;

use duckdb::types::ToSqlOutput;
use duckdb::ToSql;
use thiserror::Error;
use time::format_description::{self, BorrowedFormatItem};
use time::Date;

/// Filter validation errors, raised before any query executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid metric '{value}', expected one of cases, deaths, cases_per_100k, deaths_per_100k")]
    InvalidMetric { value: String },

    #[error("invalid interval '{value}', expected 'day' or 'month'")]
    InvalidInterval { value: String },

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("date range start {start} is after end {end}")]
    InvertedDateRange { start: String, end: String },

    #[error("an exact date and a date range are mutually exclusive")]
    AmbiguousDateFilters,

    #[error("limit must be greater than zero")]
    ZeroLimit,

    #[error("unknown county '{value}'")]
    UnknownCounty { value: String },

    #[error("invalid feature '{value}', expected a case rate or population ratio column")]
    InvalidFeature { value: String },
}

/// Tables and views a query may read. Never constructed from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    DailyCounts,
    CountyDemographics,
    CasesDemographics,
    TrendView,
    CrossSectionalView,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DailyCounts => "daily_counts",
            Self::CountyDemographics => "county_demographics",
            Self::CasesDemographics => "cases_demographics",
            Self::TrendView => "vw_trend",
            Self::CrossSectionalView => "vw_cases_demographics",
        }
    }

    /// Column holding the county identifier in this table.
    const fn entity_column(self) -> &'static str {
        match self {
            Self::CountyDemographics => "county_name",
            _ => "area",
        }
    }

    /// Column holding the observation date in this table.
    const fn date_column(self) -> &'static str {
        match self {
            Self::CasesDemographics => "report_date",
            _ => "date",
        }
    }
}

/// The metric enumeration exposed on the request surface.
///
/// Absolute counts are summed when bucketed; per-capita rates are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cases,
    Deaths,
    CasesPer100k,
    DeathsPer100k,
}

impl Metric {
    pub const ALL: [Self; 4] = [
        Self::Cases,
        Self::Deaths,
        Self::CasesPer100k,
        Self::DeathsPer100k,
    ];

    /// Parse the public metric name used by the request surface.
    ///
    /// # Errors
    /// Returns `FilterError::InvalidMetric` for anything outside the
    /// enumeration.
    pub fn parse(value: &str) -> Result<Self, FilterError> {
        match value {
            "cases" => Ok(Self::Cases),
            "deaths" => Ok(Self::Deaths),
            "cases_per_100k" => Ok(Self::CasesPer100k),
            "deaths_per_100k" => Ok(Self::DeathsPer100k),
            other => Err(FilterError::InvalidMetric {
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cases => "cases",
            Self::Deaths => "deaths",
            Self::CasesPer100k => "cases_per_100k",
            Self::DeathsPer100k => "deaths_per_100k",
        }
    }

    /// Storage column in `vw_trend`, also used as the aggregate output alias.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Cases => "total_cases",
            Self::Deaths => "total_deaths",
            Self::CasesPer100k => "cases_per_100k",
            Self::DeathsPer100k => "deaths_per_100k",
        }
    }

    /// Aggregate function applied when bucketing this metric over time.
    const fn aggregate(self) -> &'static str {
        match self {
            Self::Cases | Self::Deaths => "SUM",
            Self::CasesPer100k | Self::DeathsPer100k => "AVG",
        }
    }
}

/// Time bucketing applied to trend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    #[default]
    Day,
    Month,
}

impl Interval {
    /// Parse the public interval name.
    ///
    /// # Errors
    /// Returns `FilterError::InvalidInterval` for anything else.
    pub fn parse(value: &str) -> Result<Self, FilterError> {
        match value {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            other => Err(FilterError::InvalidInterval {
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Period expression for the SELECT list. Month bucketing truncates to
    /// the first of the month.
    const fn period_expr(self) -> &'static str {
        match self {
            Self::Day => "date",
            Self::Month => "CAST(DATE_TRUNC('month', date) AS DATE)",
        }
    }
}

fn date_format() -> &'static [BorrowedFormatItem<'static>] {
    static FORMAT: OnceLock<Vec<BorrowedFormatItem<'static>>> = OnceLock::new();
    FORMAT.get_or_init(|| {
        format_description::parse("[year]-[month]-[day]").expect("static date format")
    })
}

/// Parse a `YYYY-MM-DD` date from the request surface.
///
/// # Errors
/// Returns `FilterError::InvalidDate` when the value does not parse.
pub fn parse_date(value: &str) -> Result<Date, FilterError> {
    Date::parse(value, date_format()).map_err(|_| FilterError::InvalidDate {
        value: value.to_string(),
    })
}

/// Format a date as `YYYY-MM-DD` for parameter binding and output.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(date_format())
        .expect("static date format is always formattable")
}

/// Declarative filter set applied to a query. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    county: Option<String>,
    date: Option<Date>,
    date_range: Option<(Date, Date)>,
    category: Option<String>,
    metric: Option<Metric>,
    interval: Interval,
}

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    #[must_use]
    pub fn date(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }

    #[must_use]
    pub fn date_range(mut self, start: Date, end: Date) -> Self {
        self.date_range = Some((start, end));
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Reject combinations a well-formed request never carries.
    ///
    /// # Errors
    /// - `AmbiguousDateFilters` when both an exact date and a range are set
    /// - `InvertedDateRange` when the range start is after its end
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.date.is_some() && self.date_range.is_some() {
            return Err(FilterError::AmbiguousDateFilters);
        }
        if let Some((start, end)) = self.date_range {
            if start > end {
                return Err(FilterError::InvertedDateRange {
                    start: format_date(start),
                    end: format_date(end),
                });
            }
        }
        Ok(())
    }
}

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(value) => value.to_sql(),
            Self::Int(value) => value.to_sql(),
        }
    }
}

/// Query text plus its ordered parameter tuple.
///
/// Compared and hashed by value; this is the cache signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Builds a parameterized SELECT over one of the fixed tables or views.
#[derive(Debug)]
pub struct QueryBuilder {
    table: Table,
    sql: String,
    params: Vec<SqlParam>,
    group_by: Option<&'static str>,
    order_by: Option<String>,
    limit: Option<i64>,
}

impl QueryBuilder {
    /// `SELECT *` over the whole table, predicates appended per filter.
    #[must_use]
    pub fn select_all(table: Table) -> Self {
        let sql = format!("SELECT * FROM {} WHERE 1=1", table.name());
        Self::with_sql(table, sql)
    }

    /// Time-bucketed trend aggregate over `vw_trend`, driven by the filter
    /// set's interval and metric selection.
    ///
    /// With a metric, emits that metric's aggregate alone; without one, all
    /// four metrics are aggregated side by side. Predicates are appended
    /// from the same filter set.
    ///
    /// # Errors
    /// Propagates [`FilterSet::validate`] failures.
    pub fn trend(filters: &FilterSet) -> Result<Self, FilterError> {
        let table = Table::TrendView;
        let mut select = format!("SELECT {} AS period", filters.interval.period_expr());
        let metrics: &[Metric] = match filters.metric {
            Some(ref metric) => std::slice::from_ref(metric),
            None => &Metric::ALL,
        };
        for metric in metrics {
            let _ = write!(
                select,
                ", {agg}({col}) AS {col}",
                agg = metric.aggregate(),
                col = metric.column()
            );
        }
        let _ = write!(select, " FROM {} WHERE 1=1", table.name());

        let mut builder = Self::with_sql(table, select);
        builder.group_by = Some("period");
        builder.order_by = Some("period".to_string());
        builder.filters(filters)
    }

    /// Per-county averaged metric for descending rankings over `vw_trend`.
    #[must_use]
    pub fn top_by_metric(metric: Metric) -> Self {
        let table = Table::TrendView;
        let sql = format!(
            "SELECT area, AVG({col}) AS avg_{col} FROM {table} WHERE 1=1",
            col = metric.column(),
            table = table.name()
        );
        let mut builder = Self::with_sql(table, sql);
        builder.group_by = Some("area");
        builder.order_by = Some(format!("avg_{} DESC", metric.column()));
        builder
    }

    /// The entity directory: every known county name, ordered.
    #[must_use]
    pub fn county_directory() -> Self {
        let table = Table::CountyDemographics;
        let sql = format!("SELECT county_name FROM {} WHERE 1=1", table.name());
        let mut builder = Self::with_sql(table, sql);
        builder.order_by = Some("county_name".to_string());
        builder
    }

    fn with_sql(table: Table, sql: String) -> Self {
        Self {
            table,
            sql,
            params: Vec::new(),
            group_by: None,
            order_by: None,
            limit: None,
        }
    }

    /// Append the county, date, range, and category predicates of a filter
    /// set after validating it.
    ///
    /// # Errors
    /// Propagates [`FilterSet::validate`] failures; nothing is appended on
    /// error.
    pub fn filters(mut self, filters: &FilterSet) -> Result<Self, FilterError> {
        filters.validate()?;
        if let Some(county) = &filters.county {
            self.push_text_eq(self.table.entity_column(), county.clone());
        }
        if let Some(date) = filters.date {
            self.push_date_eq(date);
        }
        if let Some((start, end)) = filters.date_range {
            self.push_date_between(start, end);
        }
        if let Some(category) = &filters.category {
            self.push_text_eq("demographic_category", category.clone());
        }
        Ok(self)
    }

    /// Truncate the result server-side; the limit travels as a parameter.
    ///
    /// # Errors
    /// Returns `FilterError::ZeroLimit` for a zero limit.
    pub fn limit(mut self, limit: i64) -> Result<Self, FilterError> {
        if limit <= 0 {
            return Err(FilterError::ZeroLimit);
        }
        self.limit = Some(limit);
        Ok(self)
    }

    fn push_text_eq(&mut self, column: &'static str, value: String) {
        let _ = write!(self.sql, " AND {column} = ?");
        self.params.push(SqlParam::Text(value));
    }

    fn push_date_eq(&mut self, date: Date) {
        let _ = write!(self.sql, " AND {} = CAST(? AS DATE)", self.table.date_column());
        self.params.push(SqlParam::Text(format_date(date)));
    }

    fn push_date_between(&mut self, start: Date, end: Date) {
        let _ = write!(
            self.sql,
            " AND {} BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
            self.table.date_column()
        );
        self.params.push(SqlParam::Text(format_date(start)));
        self.params.push(SqlParam::Text(format_date(end)));
    }

    /// Finish the query, appending GROUP BY / ORDER BY / LIMIT clauses.
    #[must_use]
    pub fn build(mut self) -> BoundQuery {
        if let Some(group_by) = self.group_by {
            let _ = write!(self.sql, " GROUP BY {group_by}");
        }
        if let Some(order_by) = &self.order_by {
            let _ = write!(self.sql, " ORDER BY {order_by}");
        }
        if let Some(limit) = self.limit {
            self.sql.push_str(" LIMIT ?");
            self.params.push(SqlParam::Int(limit));
        }
        BoundQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> Date {
        parse_date(value).expect("test date")
    }

    #[test]
    fn identical_filter_sets_produce_identical_signatures() {
        let build = || {
            QueryBuilder::select_all(Table::CrossSectionalView)
                .filters(
                    &FilterSet::new()
                        .county("Los Angeles")
                        .date_range(date("2022-01-01"), date("2022-03-31")),
                )
                .expect("valid filters")
                .build()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn user_values_are_bound_never_interpolated() {
        let hostile = "Alameda'; DROP TABLE daily_counts; --";
        let query = QueryBuilder::select_all(Table::DailyCounts)
            .filters(&FilterSet::new().county(hostile))
            .expect("valid filters")
            .build();

        assert!(!query.sql.contains(hostile), "value leaked into query text");
        assert!(query.sql.contains("area = ?"));
        assert_eq!(query.params, vec![SqlParam::Text(hostile.to_string())]);
    }

    #[test]
    fn empty_filter_set_emits_tautological_where() {
        let query = QueryBuilder::select_all(Table::CountyDemographics)
            .filters(&FilterSet::new())
            .expect("valid filters")
            .build();
        assert_eq!(query.sql, "SELECT * FROM county_demographics WHERE 1=1");
        assert!(query.params.is_empty());
    }

    #[test]
    fn date_and_range_together_are_rejected() {
        let error = QueryBuilder::select_all(Table::CrossSectionalView)
            .filters(
                &FilterSet::new()
                    .date(date("2022-12-31"))
                    .date_range(date("2022-01-01"), date("2022-12-31")),
            )
            .expect_err("must reject");
        assert_eq!(error, FilterError::AmbiguousDateFilters);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let error = FilterSet::new()
            .date_range(date("2022-06-01"), date("2022-01-01"))
            .validate()
            .expect_err("must reject");
        assert!(matches!(error, FilterError::InvertedDateRange { .. }));
    }

    #[test]
    fn monthly_trend_truncates_period_and_groups() {
        let filters = FilterSet::new()
            .county("Alameda")
            .metric(Metric::Cases)
            .interval(Interval::Month);
        let query = QueryBuilder::trend(&filters).expect("valid filters").build();
        assert!(query.sql.starts_with(
            "SELECT CAST(DATE_TRUNC('month', date) AS DATE) AS period, SUM(total_cases) AS total_cases"
        ));
        assert!(query.sql.ends_with("GROUP BY period ORDER BY period"));
    }

    #[test]
    fn per_capita_metrics_average_instead_of_sum() {
        let filters = FilterSet::new().metric(Metric::CasesPer100k);
        let query = QueryBuilder::trend(&filters).expect("valid filters").build();
        assert!(query.sql.contains("AVG(cases_per_100k) AS cases_per_100k"));
    }

    #[test]
    fn trend_without_metric_aggregates_all_four() {
        let query = QueryBuilder::trend(&FilterSet::new())
            .expect("valid filters")
            .build();
        for column in ["total_cases", "total_deaths", "cases_per_100k", "deaths_per_100k"] {
            assert!(query.sql.contains(column), "missing {column}");
        }
    }

    #[test]
    fn limit_is_a_bound_parameter() {
        let query = QueryBuilder::top_by_metric(Metric::DeathsPer100k)
            .limit(10)
            .expect("valid limit")
            .build();
        assert!(query.sql.ends_with("ORDER BY avg_deaths_per_100k DESC LIMIT ?"));
        assert_eq!(query.params.last(), Some(&SqlParam::Int(10)));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let error = QueryBuilder::top_by_metric(Metric::Cases)
            .limit(0)
            .expect_err("must reject");
        assert_eq!(error, FilterError::ZeroLimit);
    }

    #[test]
    fn metric_parsing_is_a_closed_enumeration() {
        assert_eq!(Metric::parse("cases"), Ok(Metric::Cases));
        assert_eq!(Metric::parse("deaths_per_100k"), Ok(Metric::DeathsPer100k));
        assert!(matches!(
            Metric::parse("cases; DROP TABLE daily_counts"),
            Err(FilterError::InvalidMetric { .. })
        ));
    }

    #[test]
    fn interval_parsing_is_a_closed_enumeration() {
        assert_eq!(Interval::parse("month"), Ok(Interval::Month));
        assert!(matches!(
            Interval::parse("week"),
            Err(FilterError::InvalidInterval { .. })
        ));
    }
}
