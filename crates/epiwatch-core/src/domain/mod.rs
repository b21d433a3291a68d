//! Request-scoped domain values shaped from warehouse results.

pub mod features;
pub mod series;

pub use features::{validate_features, FeatureTable, FeatureVector, ALLOWED_FEATURES};
pub use series::{TimeSeriesPoint, TrendSeries};
