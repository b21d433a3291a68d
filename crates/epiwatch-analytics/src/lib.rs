//! # Epiwatch Analytics
//!
//! Statistical engines over the aggregation service's shaped outputs:
//!
//! - [`forecast`]: fixed-order ARIMA(1,1,1) forecasting of a county
//!   trend series, with explicit failure on non-convergence
//! - [`cluster`]: seeded k-means over standardized county features
//!
//! Both engines are pure: they consume request-scoped domain values and
//! return fresh results, persisting nothing.

pub mod cluster;
pub mod error;
pub mod forecast;

pub use cluster::{cluster_counties, ClusterAssignment, ClusterResult, DEFAULT_SEED};
pub use error::AnalyticsError;
pub use forecast::{forecast_arima, ForecastResult, MIN_OBSERVATIONS};
