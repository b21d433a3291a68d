//! Per-county feature tables shaped from the cross-sectional view.

use serde_json::Value;

use epiwatch_warehouse::{FilterError, QueryResult};

/// Columns of the cross-sectional view that may be selected as clustering
/// features. Anything outside this list is rejected before a query runs.
pub const ALLOWED_FEATURES: [&str; 14] = [
    "cases_per_100k",
    "deaths_per_100k",
    "male_population_ratio",
    "female_population_ratio",
    "w_population_ratio",
    "b_population_ratio",
    "o_population_ratio",
    "nh_population_ratio",
    "hi_population_ratio",
    "na_population_ratio",
    "age_0_19_population_ratio",
    "age_20_49_population_ratio",
    "age_50_64_population_ratio",
    "age_65_plus_population_ratio",
];

/// Check every requested feature name against the closed enumeration.
///
/// # Errors
/// Returns `FilterError::InvalidFeature` naming the first offender.
pub fn validate_features(features: &[String]) -> Result<(), FilterError> {
    for feature in features {
        if !ALLOWED_FEATURES.contains(&feature.as_str()) {
            return Err(FilterError::InvalidFeature {
                value: feature.clone(),
            });
        }
    }
    Ok(())
}

/// One county's selected feature values, in feature order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub entity: String,
    pub values: Vec<f64>,
}

/// A set of feature vectors keyed by unique county, with the feature names
/// they were selected under. Never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    features: Vec<String>,
    vectors: Vec<FeatureVector>,
}

impl FeatureTable {
    /// Build a table from already-shaped vectors. Vectors whose value count
    /// does not match the feature count, or whose county was already seen,
    /// are dropped.
    #[must_use]
    pub fn new(features: Vec<String>, vectors: Vec<FeatureVector>) -> Self {
        let mut unique: Vec<FeatureVector> = Vec::with_capacity(vectors.len());
        for vector in vectors {
            if vector.values.len() != features.len() {
                continue;
            }
            if unique.iter().any(|seen| seen.entity == vector.entity) {
                continue;
            }
            unique.push(vector);
        }
        Self {
            features,
            vectors: unique,
        }
    }

    /// Shape a cross-sectional result into a feature table.
    ///
    /// Rows with a null or non-finite value in any selected feature are
    /// dropped; when a county appears more than once (several dates in the
    /// underlying view), the first complete row wins.
    #[must_use]
    pub fn from_result(result: &QueryResult, features: &[String]) -> Self {
        let Some(entity_index) = result.column_index("area") else {
            return Self {
                features: features.to_vec(),
                vectors: Vec::new(),
            };
        };
        let feature_indices: Option<Vec<usize>> = features
            .iter()
            .map(|feature| result.column_index(feature))
            .collect();
        let Some(feature_indices) = feature_indices else {
            return Self {
                features: features.to_vec(),
                vectors: Vec::new(),
            };
        };

        let mut vectors: Vec<FeatureVector> = Vec::new();
        for row in &result.rows {
            let Some(Value::String(entity)) = row.get(entity_index) else {
                continue;
            };
            if vectors.iter().any(|vector| &vector.entity == entity) {
                continue;
            }
            let values: Option<Vec<f64>> = feature_indices
                .iter()
                .map(|&index| {
                    row.get(index)
                        .and_then(Value::as_f64)
                        .filter(|value| value.is_finite())
                })
                .collect();
            if let Some(values) = values {
                vectors.push(FeatureVector {
                    entity: entity.clone(),
                    values,
                });
            }
        }

        Self {
            features: features.to_vec(),
            vectors,
        }
    }

    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    #[must_use]
    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    /// Number of complete counties in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}
