use thiserror::Error;

use epiwatch_analytics::AnalyticsError;
use epiwatch_core::ServiceError;
use epiwatch_warehouse::WarehouseError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Stable kind tag for the structured error object printed on failure.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Service(error) => error.kind(),
            Self::Analytics(error) => error.kind(),
            Self::Warehouse(_) => "warehouse",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Service(ServiceError::InvalidFilter(_)) => 2,
            Self::Service(ServiceError::NotFound(_)) => 3,
            Self::Service(ServiceError::UpstreamUnavailable(_)) => 4,
            Self::Analytics(AnalyticsError::InsufficientData(_)) => 5,
            Self::Analytics(_) => 6,
            Self::Warehouse(_) => 4,
            Self::Serialization(_) => 7,
            Self::Io(_) => 10,
        }
    }
}
