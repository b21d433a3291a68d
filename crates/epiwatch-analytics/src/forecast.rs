//! ARIMA(1,1,1) forecasting over a county trend series.
//!
//! The model order is fixed: one autoregressive term, one differencing
//! pass, one moving-average term. The series is differenced once and the
//! ARMA(1,1) coefficients are estimated by conditional sum-of-squares,
//! minimized with Levenberg-Marquardt. Non-convergence is a hard error;
//! there is no fallback to a simpler model.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{Dyn, OMatrix, OVector, Owned, Vector2, U2};
use time::{Date, Month};

use epiwatch_core::{Interval, TimeSeriesPoint, TrendSeries};

use crate::error::AnalyticsError;

/// Fewest observations accepted for a fit: the order terms (1 + 1 + 1)
/// plus one.
pub const MIN_OBSERVATIONS: usize = 4;

/// An observed series together with its forecast continuation.
///
/// Forecast periods start exactly one period after the last observed
/// period and never overlap the observed data.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub observed: TrendSeries,
    pub forecast: TrendSeries,
    pub horizon: usize,
}

/// ARMA(1,1) conditional sum-of-squares problem on the differenced series.
///
/// The optimizer searches over `[a, b]` with `phi = tanh(a)` and
/// `theta = tanh(b)`, so the AR coefficient stays stationary and the MA
/// coefficient invertible for every parameter vector the solver visits.
struct ArmaProblem {
    /// Parameter vector `[a, b]`.
    params: Vector2<f64>,
    /// First differences of the observed values.
    diffs: Vec<f64>,
}

impl ArmaProblem {
    fn coefficients(&self) -> (f64, f64) {
        (self.params[0].tanh(), self.params[1].tanh())
    }

    /// Residual recursion with pre-sample difference and shock set to zero:
    /// `e_t = w_t - phi * w_(t-1) - theta * e_(t-1)`, and its gradients
    /// w.r.t. phi and theta, which share the same recursion.
    fn residuals_and_gradients(&self) -> (Vec<f64>, Vec<(f64, f64)>) {
        let (phi, theta) = self.coefficients();
        let n = self.diffs.len();
        let mut residuals = vec![0.0; n];
        let mut gradients = vec![(0.0, 0.0); n];

        for t in 0..n {
            let (prev_w, prev_e, prev_grad) = if t == 0 {
                (0.0, 0.0, (0.0, 0.0))
            } else {
                (self.diffs[t - 1], residuals[t - 1], gradients[t - 1])
            };
            residuals[t] = self.diffs[t] - phi * prev_w - theta * prev_e;
            gradients[t] = (
                -prev_w - theta * prev_grad.0,
                -prev_e - theta * prev_grad.1,
            );
        }

        (residuals, gradients)
    }
}

impl LeastSquaresProblem<f64, Dyn, U2> for ArmaProblem {
    type ParameterStorage = Owned<f64, U2>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U2>;

    fn set_params(&mut self, params: &Vector2<f64>) {
        self.params.copy_from(params);
    }

    fn params(&self) -> Vector2<f64> {
        self.params
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        let (residuals, _) = self.residuals_and_gradients();
        Some(OVector::<f64, Dyn>::from_vec(residuals))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U2>> {
        let (_, gradients) = self.residuals_and_gradients();
        // Chain rule through the tanh reparameterization.
        let da = 1.0 - self.params[0].tanh().powi(2);
        let db = 1.0 - self.params[1].tanh().powi(2);

        let mut jacobian = OMatrix::<f64, Dyn, U2>::zeros(gradients.len());
        for (t, gradient) in gradients.iter().enumerate() {
            jacobian[(t, 0)] = gradient.0 * da;
            jacobian[(t, 1)] = gradient.1 * db;
        }
        Some(jacobian)
    }
}

/// Initial AR estimate from the lag-1 autocorrelation of the differences,
/// clamped away from the unit circle. The MA term starts slightly off zero
/// so the two gradient columns are not collinear at the first step.
fn initial_params(diffs: &[f64]) -> Vector2<f64> {
    let n = diffs.len();
    let mean = diffs.iter().sum::<f64>() / n as f64;
    let denominator: f64 = diffs.iter().map(|w| (w - mean).powi(2)).sum();

    let phi = if denominator > f64::EPSILON {
        let numerator: f64 = diffs
            .windows(2)
            .map(|pair| (pair[0] - mean) * (pair[1] - mean))
            .sum();
        (numerator / denominator).clamp(-0.9, 0.9)
    } else {
        0.0
    };

    Vector2::new(phi.atanh(), 0.1_f64.atanh())
}

/// Step one period forward: next day, or next month start for a
/// month-bucketed series.
fn next_period(period: Date, interval: Interval) -> Option<Date> {
    match interval {
        Interval::Day => period.next_day(),
        Interval::Month => {
            let (year, month) = match period.month() {
                Month::December => (period.year() + 1, Month::January),
                month => (period.year(), month.next()),
            };
            Date::from_calendar_date(year, month, 1).ok()
        }
    }
}

/// Fit ARIMA(1,1,1) to the series and forecast `horizon` further periods.
///
/// # Errors
/// - `InsufficientData` when fewer than [`MIN_OBSERVATIONS`] clean points
///   remain
/// - `ForecastFailed` on non-convergence or non-finite output; never a
///   partial or zero-filled forecast
pub fn forecast_arima(
    series: &TrendSeries,
    horizon: usize,
    interval: Interval,
) -> Result<ForecastResult, AnalyticsError> {
    if series.len() < MIN_OBSERVATIONS {
        return Err(AnalyticsError::InsufficientData(format!(
            "ARIMA(1,1,1) needs at least {MIN_OBSERVATIONS} observations, got {}",
            series.len()
        )));
    }

    let values = series.values();
    let diffs: Vec<f64> = values.windows(2).map(|pair| pair[1] - pair[0]).collect();

    // A flat series has nothing to fit: the differenced process is
    // identically zero and the forecast continues the last level.
    if diffs.iter().all(|diff| diff.abs() < 1e-12) {
        return continue_levels(series, horizon, interval, 0.0, 0.0, 0.0, 0.0);
    }

    let problem = ArmaProblem {
        params: initial_params(&diffs),
        diffs,
    };
    let (fitted, report) = LevenbergMarquardt::new().minimize(problem);

    if !report.termination.was_successful() {
        return Err(AnalyticsError::ForecastFailed(format!(
            "ARIMA(1,1,1) fit did not converge: {:?}",
            report.termination
        )));
    }

    let (phi, theta) = fitted.coefficients();
    if !phi.is_finite() || !theta.is_finite() {
        return Err(AnalyticsError::ForecastFailed(
            "ARIMA(1,1,1) fit produced non-finite coefficients".to_string(),
        ));
    }
    debug!("arima fit: phi={phi:.4}, theta={theta:.4}");

    let (residuals, _) = fitted.residuals_and_gradients();
    let last_diff = fitted.diffs.last().copied().unwrap_or(0.0);
    let last_shock = residuals.last().copied().unwrap_or(0.0);

    continue_levels(series, horizon, interval, phi, theta, last_diff, last_shock)
}

/// Forecast recursion: the MA shock only contributes at the first step,
/// after which the differenced forecast decays by phi. Undo the
/// differencing by accumulating onto the last observed level.
fn continue_levels(
    series: &TrendSeries,
    horizon: usize,
    interval: Interval,
    phi: f64,
    theta: f64,
    last_diff: f64,
    last_shock: f64,
) -> Result<ForecastResult, AnalyticsError> {
    let last_value = series.values().last().copied().unwrap_or(0.0);
    let last_period = series
        .last_period()
        .ok_or_else(|| AnalyticsError::ForecastFailed("series has no periods".to_string()))?;

    let mut points = Vec::with_capacity(horizon);
    let mut diff_forecast = phi * last_diff + theta * last_shock;
    let mut level = last_value;
    let mut period = last_period;
    for _ in 0..horizon {
        period = next_period(period, interval).ok_or_else(|| {
            AnalyticsError::ForecastFailed("forecast period overflowed the calendar".to_string())
        })?;
        level += diff_forecast;
        if !level.is_finite() {
            return Err(AnalyticsError::ForecastFailed(
                "forecast produced non-finite values".to_string(),
            ));
        }
        points.push(TimeSeriesPoint {
            period,
            value: level,
        });
        diff_forecast *= phi;
    }

    Ok(ForecastResult {
        observed: series.clone(),
        forecast: TrendSeries::from_points(points),
        horizon,
    })
}
