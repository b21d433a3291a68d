//! # Epiwatch Core
//!
//! Domain contracts and the aggregation service for the epiwatch analytics
//! stack.
//!
//! ## Overview
//!
//! This crate provides the layers between the warehouse and the analytic
//! engines:
//!
//! - **Result cache** with exact-match signatures, LRU eviction, and
//!   single-flight coalescing of concurrent misses
//! - **Aggregation service** exposing the typed query operations (county
//!   summary, trend, cross-sectional view, top-N ranking)
//! - **Domain shaping** of raw result sets into clean trend series and
//!   per-county feature tables
//! - **Typed service errors**: validation failures before any I/O,
//!   warehouse failures converted at the boundary
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Bounded single-flight result cache |
//! | [`domain`] | Trend series and feature table shaping |
//! | [`error`] | Service error kinds |
//! | [`service`] | Aggregation service operations |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use epiwatch_core::{AggregationService, Warehouse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     let service = AggregationService::with_defaults(warehouse);
//!
//!     let trend = service.get_trend(Some("Los Angeles"), Some("cases"), "day").await?;
//!     println!("{} periods", trend.row_count);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod domain;
pub mod error;
pub mod service;

// Caching
pub use cache::ResultCache;

// Domain shaping
pub use domain::{
    validate_features, FeatureTable, FeatureVector, TimeSeriesPoint, TrendSeries, ALLOWED_FEATURES,
};

// Error types
pub use error::ServiceError;

// Service operations
pub use service::{AggregationService, Record, ServiceConfig, SummaryLookup};

// Warehouse surface (re-exported from epiwatch-warehouse)
pub use epiwatch_warehouse::{
    format_date, parse_date, BoundQuery, FilterError, FilterSet, Interval, Metric, QueryBuilder,
    QueryGuardrails, QueryResult, SqlColumn, SqlParam, Table, Warehouse, WarehouseConfig,
    WarehouseError,
};
