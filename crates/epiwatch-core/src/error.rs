use thiserror::Error;

use epiwatch_warehouse::{FilterError, WarehouseError};

/// Typed failures surfaced by the aggregation service.
///
/// Validation failures are raised before any I/O; warehouse transport
/// failures are converted at the service boundary and never cached.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller-supplied value outside its enumeration, or mutually exclusive
    /// filters both set.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Well-formed query that matched zero rows.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection or transport failure talking to the warehouse.
    #[error("warehouse unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ServiceError {
    /// Stable kind tag for structured error output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidFilter(_) => "invalid_filter",
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

impl From<FilterError> for ServiceError {
    fn from(error: FilterError) -> Self {
        Self::InvalidFilter(error.to_string())
    }
}

impl From<WarehouseError> for ServiceError {
    fn from(error: WarehouseError) -> Self {
        Self::UpstreamUnavailable(error.to_string())
    }
}
