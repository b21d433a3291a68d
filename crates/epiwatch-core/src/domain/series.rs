//! Chronological trend series shaped from trend query results.

use serde_json::Value;
use time::Date;

use epiwatch_warehouse::{parse_date, QueryResult};

/// One aggregated observation: a period and its metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub period: Date,
    pub value: f64,
}

/// A chronologically ordered series, strictly increasing in period with no
/// duplicates. Never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSeries {
    points: Vec<TimeSeriesPoint>,
}

impl TrendSeries {
    /// Build a series from raw points: sorts chronologically, keeps the
    /// first of any duplicate period, and drops non-finite values.
    #[must_use]
    pub fn from_points(mut points: Vec<TimeSeriesPoint>) -> Self {
        points.retain(|point| point.value.is_finite());
        points.sort_by_key(|point| point.period);
        points.dedup_by_key(|point| point.period);
        Self { points }
    }

    /// Shape a trend query result into a series, reading the `period`
    /// column and the named value column. Rows with a null or unparseable
    /// period or value are dropped.
    #[must_use]
    pub fn from_result(result: &QueryResult, value_column: &str) -> Self {
        let Some(period_index) = result.column_index("period") else {
            return Self::default();
        };
        let Some(value_index) = result.column_index(value_column) else {
            return Self::default();
        };

        let points = result
            .rows
            .iter()
            .filter_map(|row| {
                let period = row.get(period_index).and_then(parse_period)?;
                let value = row.get(value_index).and_then(parse_value)?;
                Some(TimeSeriesPoint { period, value })
            })
            .collect();

        Self::from_points(points)
    }

    #[must_use]
    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.value).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn last_period(&self) -> Option<Date> {
        self.points.last().map(|point| point.period)
    }
}

fn parse_period(value: &Value) -> Option<Date> {
    match value {
        Value::String(text) => {
            // Timestamps come through as RFC 3339; the date prefix is enough.
            let date_part = text.get(..10).unwrap_or(text);
            parse_date(date_part).ok()
        }
        _ => None,
    }
}

fn parse_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()),
        Value::String(text) => text.parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epiwatch_warehouse::SqlColumn;
    use serde_json::json;

    fn date(value: &str) -> Date {
        parse_date(value).expect("test date")
    }

    fn trend_result(rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: vec![
                SqlColumn {
                    name: "period".to_string(),
                    r#type: "DATE".to_string(),
                },
                SqlColumn {
                    name: "total_cases".to_string(),
                    r#type: "DOUBLE".to_string(),
                },
            ],
            row_count: rows.len(),
            rows,
            truncated: false,
        }
    }

    #[test]
    fn sorts_chronologically_and_drops_bad_rows() {
        let result = trend_result(vec![
            vec![json!("2022-01-03"), json!(30.0)],
            vec![json!("2022-01-01"), json!(10.0)],
            vec![json!(null), json!(99.0)],
            vec![json!("2022-01-02"), json!(null)],
            vec![json!("not-a-date"), json!(50.0)],
        ]);

        let series = TrendSeries::from_result(&result, "total_cases");
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].period, date("2022-01-01"));
        assert_eq!(series.points()[1].period, date("2022-01-03"));
    }

    #[test]
    fn duplicate_periods_keep_first_occurrence() {
        let series = TrendSeries::from_points(vec![
            TimeSeriesPoint {
                period: date("2022-01-01"),
                value: 1.0,
            },
            TimeSeriesPoint {
                period: date("2022-01-01"),
                value: 2.0,
            },
        ]);
        assert_eq!(series.len(), 1);
        assert!((series.points()[0].value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_value_column_yields_empty_series() {
        let result = trend_result(vec![vec![json!("2022-01-01"), json!(1.0)]]);
        let series = TrendSeries::from_result(&result, "deaths_per_100k");
        assert!(series.is_empty());
    }

    #[test]
    fn numeric_strings_parse_as_values() {
        let result = trend_result(vec![vec![json!("2022-01-01"), json!("42.5")]]);
        let series = TrendSeries::from_result(&result, "total_cases");
        assert_eq!(series.len(), 1);
        assert!((series.points()[0].value - 42.5).abs() < f64::EPSILON);
    }
}
