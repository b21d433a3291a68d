//! The aggregation service: typed query operations over the fixed views.
//!
//! Every read operation follows the same path: validate filters, build a
//! bound query, then resolve it through the result cache, which invokes
//! the warehouse on a blocking worker only for a miss. Validation failures
//! never reach the cache or the warehouse, and warehouse failures are never
//! stored.

use std::sync::Arc;

use log::debug;
use serde_json::Value;

use epiwatch_warehouse::{
    parse_date, BoundQuery, FilterError, FilterSet, Interval, Metric, QueryBuilder, QueryGuardrails,
    QueryResult, Table, Warehouse,
};

use crate::cache::ResultCache;
use crate::domain::{validate_features, FeatureTable, TrendSeries};
use crate::error::ServiceError;

/// A single record: column names zipped with values, in column order.
pub type Record = Vec<(String, Value)>;

/// Tagged result of a county summary lookup. Callers pattern-match instead
/// of sniffing whether one record or a list came back.
#[derive(Debug, Clone)]
pub enum SummaryLookup {
    /// A county filter was given and exactly matched.
    Found(Record),
    /// No county filter: every county's record.
    FoundMany(Arc<QueryResult>),
}

/// Tuning knobs for the service instance.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Guardrails applied to every warehouse call.
    pub guardrails: QueryGuardrails,
    /// Maximum distinct query signatures the result cache holds.
    pub cache_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            guardrails: QueryGuardrails::default(),
            cache_capacity: 512,
        }
    }
}

/// Typed query operations over the warehouse, memoized per query signature.
#[derive(Clone)]
pub struct AggregationService {
    warehouse: Warehouse,
    cache: ResultCache,
    guardrails: QueryGuardrails,
}

impl AggregationService {
    #[must_use]
    pub fn new(warehouse: Warehouse, config: ServiceConfig) -> Self {
        Self {
            warehouse,
            cache: ResultCache::new(config.cache_capacity),
            guardrails: config.guardrails,
        }
    }

    #[must_use]
    pub fn with_defaults(warehouse: Warehouse) -> Self {
        Self::new(warehouse, ServiceConfig::default())
    }

    /// The result cache owned by this service instance.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Resolve a bound query through the cache, executing on a blocking
    /// worker only on a miss.
    async fn fetch(&self, query: BoundQuery) -> Result<Arc<QueryResult>, ServiceError> {
        let signature = query.clone();
        let warehouse = self.warehouse.clone();
        let guardrails = self.guardrails;
        self.cache
            .get_or_compute(signature, move || async move {
                let executed = tokio::task::spawn_blocking(move || {
                    warehouse.execute_select(&query, guardrails)
                })
                .await;
                match executed {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(error)) => Err(ServiceError::from(error)),
                    Err(join_error) => {
                        Err(ServiceError::UpstreamUnavailable(join_error.to_string()))
                    }
                }
            })
            .await
    }

    /// The entity directory: ordered list of known county names.
    ///
    /// # Errors
    /// `UpstreamUnavailable` if the warehouse cannot be reached.
    pub async fn county_names(&self) -> Result<Vec<String>, ServiceError> {
        let query = QueryBuilder::county_directory().build();
        let result = self.fetch(query).await?;
        let index = result
            .column_index("county_name")
            .ok_or_else(|| ServiceError::NotFound("county directory is empty".to_string()))?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| match row.get(index) {
                Some(Value::String(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    /// Validate a county filter against the entity directory.
    async fn ensure_known_county(&self, county: &str) -> Result<(), ServiceError> {
        let names = self.county_names().await?;
        if names.iter().any(|name| name == county) {
            Ok(())
        } else {
            debug!("rejecting unknown county filter");
            Err(FilterError::UnknownCounty {
                value: county.to_string(),
            }
            .into())
        }
    }

    /// Demographic summary per county.
    ///
    /// With a county filter the single matching record is returned; without
    /// one, every county's record.
    ///
    /// # Errors
    /// `InvalidFilter` for an unknown county, `NotFound` when zero rows
    /// match, `UpstreamUnavailable` on warehouse failure.
    pub async fn get_county_summary(
        &self,
        county: Option<&str>,
    ) -> Result<SummaryLookup, ServiceError> {
        if let Some(county) = county {
            self.ensure_known_county(county).await?;
        }

        let mut filters = FilterSet::new();
        if let Some(county) = county {
            filters = filters.county(county);
        }
        let query = QueryBuilder::select_all(Table::CountyDemographics)
            .filters(&filters)?
            .build();
        let result = self.fetch(query).await?;

        if result.row_count == 0 {
            return Err(ServiceError::NotFound(match county {
                Some(county) => format!("no demographics for county '{county}'"),
                None => "no demographics loaded".to_string(),
            }));
        }

        Ok(match county {
            Some(_) => SummaryLookup::Found(result.record(0)),
            None => SummaryLookup::FoundMany(result),
        })
    }

    /// Time-bucketed metric aggregate, shaped as `(period, value[s])` rows.
    ///
    /// `interval = "month"` truncates periods to month start; counts are
    /// summed and per-capita rates averaged. Without a metric all four
    /// aggregates are emitted side by side.
    ///
    /// # Errors
    /// `InvalidFilter` before any I/O for an out-of-enumeration metric or
    /// interval or an unknown county; `NotFound` when zero rows match.
    pub async fn get_trend(
        &self,
        county: Option<&str>,
        metric: Option<&str>,
        interval: &str,
    ) -> Result<Arc<QueryResult>, ServiceError> {
        let metric = metric.map(Metric::parse).transpose()?;
        let interval = Interval::parse(interval)?;
        if let Some(county) = county {
            self.ensure_known_county(county).await?;
        }

        let mut filters = FilterSet::new().interval(interval);
        if let Some(metric) = metric {
            filters = filters.metric(metric);
        }
        if let Some(county) = county {
            filters = filters.county(county);
        }
        let query = QueryBuilder::trend(&filters)?.build();
        let result = self.fetch(query).await?;

        if result.row_count == 0 {
            return Err(ServiceError::NotFound("no trend data matched".to_string()));
        }
        Ok(result)
    }

    /// Cross-sectional snapshot joining case/death metrics with demographic
    /// ratios, one row per county and date.
    ///
    /// Accepts an exact date or an inclusive date range, never both.
    ///
    /// # Errors
    /// `InvalidFilter` when both date filters are set, for unparseable
    /// dates, or for an unknown county; `NotFound` when zero rows match.
    pub async fn get_cross_sectional_view(
        &self,
        county: Option<&str>,
        date: Option<&str>,
        date_range: Option<(&str, &str)>,
    ) -> Result<Arc<QueryResult>, ServiceError> {
        let mut filters = FilterSet::new();
        if let Some(county) = county {
            filters = filters.county(county);
        }
        if let Some(date) = date {
            filters = filters.date(parse_date(date)?);
        }
        if let Some((start, end)) = date_range {
            filters = filters.date_range(parse_date(start)?, parse_date(end)?);
        }
        filters.validate()?;

        if let Some(county) = county {
            self.ensure_known_county(county).await?;
        }

        let query = QueryBuilder::select_all(Table::CrossSectionalView)
            .filters(&filters)?
            .build();
        let result = self.fetch(query).await?;

        if result.row_count == 0 {
            return Err(ServiceError::NotFound(
                "no data matched the given filters".to_string(),
            ));
        }
        Ok(result)
    }

    /// Counties ranked descending by the averaged metric, truncated
    /// server-side to `limit` rows.
    ///
    /// # Errors
    /// `InvalidFilter` for an out-of-enumeration metric or a non-positive
    /// limit; `NotFound` when zero rows match.
    pub async fn get_top_n_by_metric(
        &self,
        metric: &str,
        date_range: Option<(&str, &str)>,
        limit: i64,
    ) -> Result<Arc<QueryResult>, ServiceError> {
        let metric = Metric::parse(metric)?;
        let mut filters = FilterSet::new();
        if let Some((start, end)) = date_range {
            filters = filters.date_range(parse_date(start)?, parse_date(end)?);
        }

        let query = QueryBuilder::top_by_metric(metric)
            .filters(&filters)?
            .limit(limit)?
            .build();
        let result = self.fetch(query).await?;

        if result.row_count == 0 {
            return Err(ServiceError::NotFound("no ranking data matched".to_string()));
        }
        Ok(result)
    }

    /// Statewide counts broken down by demographic group.
    ///
    /// # Errors
    /// `InvalidFilter` for an unparseable date; `NotFound` when zero rows
    /// match.
    pub async fn get_cases_demographics(
        &self,
        category: Option<&str>,
        date: Option<&str>,
    ) -> Result<Arc<QueryResult>, ServiceError> {
        let mut filters = FilterSet::new();
        if let Some(category) = category {
            filters = filters.category(category);
        }
        if let Some(date) = date {
            filters = filters.date(parse_date(date)?);
        }

        let query = QueryBuilder::select_all(Table::CasesDemographics)
            .filters(&filters)?
            .build();
        let result = self.fetch(query).await?;

        if result.row_count == 0 {
            return Err(ServiceError::NotFound(
                "no demographic breakdown matched".to_string(),
            ));
        }
        Ok(result)
    }

    /// A clean chronological series for one county and metric, ready for
    /// the forecast engine.
    ///
    /// # Errors
    /// As [`AggregationService::get_trend`].
    pub async fn trend_series(
        &self,
        county: &str,
        metric: &str,
        interval: &str,
    ) -> Result<TrendSeries, ServiceError> {
        let parsed = Metric::parse(metric)?;
        let result = self.get_trend(Some(county), Some(metric), interval).await?;
        Ok(TrendSeries::from_result(&result, parsed.column()))
    }

    /// A complete per-county feature table for the cluster engine.
    ///
    /// # Errors
    /// `InvalidFilter` for a feature outside the allow-list; otherwise as
    /// [`AggregationService::get_cross_sectional_view`].
    pub async fn feature_table(
        &self,
        features: &[String],
        date: Option<&str>,
        date_range: Option<(&str, &str)>,
    ) -> Result<FeatureTable, ServiceError> {
        validate_features(features)?;
        let result = self
            .get_cross_sectional_view(None, date, date_range)
            .await?;
        Ok(FeatureTable::from_result(&result, features))
    }
}
