use thiserror::Error;

/// Typed failures surfaced by the analytic engines.
///
/// Preconditions are checked before any fitting starts; numerical failures
/// during a fit are caught at the engine boundary and reported with a
/// cause, never as partial or zero-filled output.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Not enough clean observations to fit the model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The forecast model failed to converge or produced non-finite output.
    #[error("forecast failed: {0}")]
    ForecastFailed(String),

    /// Clustering hit a degenerate input or failed to fit.
    #[error("clustering failed: {0}")]
    ClusteringFailed(String),
}

impl AnalyticsError {
    /// Stable kind tag for structured error output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData(_) => "insufficient_data",
            Self::ForecastFailed(_) => "forecast_failed",
            Self::ClusteringFailed(_) => "clustering_failed",
        }
    }
}
