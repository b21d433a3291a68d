//! `forecast` command: ARIMA(1,1,1) continuation of a county trend.

use serde_json::{json, Value};

use epiwatch_analytics::forecast_arima;
use epiwatch_core::{format_date, AggregationService, Interval, TrendSeries};

use crate::cli::IntervalArg;
use crate::error::CliError;

pub async fn run_forecast(
    service: &AggregationService,
    county: &str,
    metric: &str,
    interval: IntervalArg,
    horizon: u16,
) -> Result<Value, CliError> {
    let series = service
        .trend_series(county, metric, interval.name())
        .await?;
    let bucketing = match interval {
        IntervalArg::Day => Interval::Day,
        IntervalArg::Month => Interval::Month,
    };

    let result = forecast_arima(&series, usize::from(horizon), bucketing)?;

    Ok(json!({
        "county": county,
        "metric": metric,
        "interval": interval.name(),
        "horizon": result.horizon,
        "observed": series_to_json(&result.observed),
        "forecast": series_to_json(&result.forecast),
    }))
}

fn series_to_json(series: &TrendSeries) -> Value {
    Value::Array(
        series
            .points()
            .iter()
            .map(|point| {
                json!({
                    "period": format_date(point.period),
                    "value": point.value,
                })
            })
            .collect(),
    )
}
