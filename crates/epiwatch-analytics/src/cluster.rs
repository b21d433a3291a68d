//! K-means clustering of counties over standardized features.
//!
//! Each selected feature is centered and scaled to unit variance across
//! the county population before distances are computed, so features with
//! larger numeric ranges do not dominate. Initialization is seeded, making
//! repeated runs with identical inputs produce identical assignments.

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use log::debug;
use ndarray::{Array1, Array2};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use epiwatch_core::FeatureTable;

use crate::error::AnalyticsError;

/// Seed used when the caller does not supply one, matching the dashboard's
/// historical default.
pub const DEFAULT_SEED: u64 = 42;

const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;

/// One county's cluster membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub entity: String,
    /// Cluster index in `0..k`.
    pub cluster: usize,
}

/// Cluster assignments plus the standardized values that produced them,
/// for callers rendering a 2-D projection of the first two features.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    pub assignments: Vec<ClusterAssignment>,
    pub features: Vec<String>,
    /// Row-major standardized feature matrix, rows parallel to
    /// `assignments`.
    pub standardized: Vec<Vec<f64>>,
    pub k: usize,
}

/// Partition the counties of a feature table into exactly `k` groups.
///
/// # Errors
/// - `InsufficientData` with fewer than 2 features, or fewer complete
///   counties than `k`
/// - `ClusteringFailed` on a zero-variance feature or a fit failure
pub fn cluster_counties(
    table: &FeatureTable,
    k: usize,
    seed: u64,
) -> Result<ClusterResult, AnalyticsError> {
    if table.feature_count() < 2 {
        return Err(AnalyticsError::InsufficientData(format!(
            "clustering needs at least 2 features, got {}",
            table.feature_count()
        )));
    }
    if k == 0 {
        return Err(AnalyticsError::InsufficientData(
            "cluster count must be at least 1".to_string(),
        ));
    }
    if table.len() < k {
        return Err(AnalyticsError::InsufficientData(format!(
            "clustering into {k} groups needs at least {k} complete counties, got {}",
            table.len()
        )));
    }

    let standardized = standardize(table)?;
    let records = Array2::from_shape_vec(
        (table.len(), table.feature_count()),
        standardized.iter().flatten().copied().collect(),
    )
    .map_err(|error| AnalyticsError::ClusteringFailed(error.to_string()))?;

    let rng = Xoshiro256Plus::seed_from_u64(seed);
    let dataset = DatasetBase::from(records.clone());
    let model = KMeans::params_with_rng(k, rng)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|error| AnalyticsError::ClusteringFailed(error.to_string()))?;

    let labels: Array1<usize> = model.predict(&records);
    debug!("k-means fit: k={k}, counties={}", table.len());

    let assignments = table
        .vectors()
        .iter()
        .zip(labels.iter())
        .map(|(vector, &cluster)| ClusterAssignment {
            entity: vector.entity.clone(),
            cluster,
        })
        .collect();

    Ok(ClusterResult {
        assignments,
        features: table.features().to_vec(),
        standardized,
        k,
    })
}

/// Center each feature and scale it to unit variance across the counties.
///
/// Uses the population standard deviation. Degenerate (zero variance)
/// features are rejected here rather than silently producing identical
/// standardized columns.
fn standardize(table: &FeatureTable) -> Result<Vec<Vec<f64>>, AnalyticsError> {
    let rows = table.len();
    let columns = table.feature_count();
    let mut output = vec![vec![0.0; columns]; rows];

    for column in 0..columns {
        let mean = table
            .vectors()
            .iter()
            .map(|vector| vector.values[column])
            .sum::<f64>()
            / rows as f64;
        let variance = table
            .vectors()
            .iter()
            .map(|vector| (vector.values[column] - mean).powi(2))
            .sum::<f64>()
            / rows as f64;
        let std_dev = variance.sqrt();

        if !std_dev.is_finite() || std_dev < f64::EPSILON {
            return Err(AnalyticsError::ClusteringFailed(format!(
                "feature '{}' has zero variance across the selected counties",
                table.features()[column]
            )));
        }

        for (row, vector) in table.vectors().iter().enumerate() {
            output[row][column] = (vector.values[column] - mean) / std_dev;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use epiwatch_core::FeatureVector;

    fn features() -> Vec<String> {
        vec!["cases_per_100k".to_string(), "deaths_per_100k".to_string()]
    }

    /// Two well-separated groups of three counties each.
    fn separated_table() -> FeatureTable {
        let vectors = vec![
            ("Alameda", vec![1.0, 0.9]),
            ("Contra Costa", vec![1.2, 1.1]),
            ("Marin", vec![0.8, 1.0]),
            ("Fresno", vec![10.0, 9.8]),
            ("Kern", vec![10.2, 10.1]),
            ("Tulare", vec![9.9, 10.0]),
        ]
        .into_iter()
        .map(|(entity, values)| FeatureVector {
            entity: entity.to_string(),
            values,
        })
        .collect();
        FeatureTable::new(features(), vectors)
    }

    #[test]
    fn one_feature_is_insufficient() {
        let table = FeatureTable::new(
            vec!["cases_per_100k".to_string()],
            vec![
                FeatureVector {
                    entity: "Alameda".to_string(),
                    values: vec![1.0],
                },
                FeatureVector {
                    entity: "Fresno".to_string(),
                    values: vec![2.0],
                },
            ],
        );
        let error = cluster_counties(&table, 2, DEFAULT_SEED).expect_err("must reject");
        assert!(matches!(error, AnalyticsError::InsufficientData(_)));
    }

    #[test]
    fn fewer_counties_than_clusters_is_insufficient() {
        let table = separated_table();
        let error = cluster_counties(&table, 7, DEFAULT_SEED).expect_err("must reject");
        assert!(matches!(error, AnalyticsError::InsufficientData(_)));
    }

    #[test]
    fn zero_variance_feature_fails_explicitly() {
        let vectors = ["Alameda", "Fresno", "Kern"]
            .iter()
            .map(|entity| FeatureVector {
                entity: (*entity).to_string(),
                values: vec![5.0, f64::from(entity.len() as u8)],
            })
            .collect();
        let table = FeatureTable::new(features(), vectors);

        let error = cluster_counties(&table, 2, DEFAULT_SEED).expect_err("must reject");
        match error {
            AnalyticsError::ClusteringFailed(cause) => {
                assert!(cause.contains("zero variance"), "cause: {cause}");
            }
            other => panic!("expected ClusteringFailed, got {other:?}"),
        }
    }

    #[test]
    fn assignments_are_reproducible_with_a_fixed_seed() {
        let table = separated_table();
        let first = cluster_counties(&table, 2, DEFAULT_SEED).expect("first run");
        let second = cluster_counties(&table, 2, DEFAULT_SEED).expect("second run");
        assert_eq!(first.assignments, second.assignments);
    }

    #[test]
    fn every_assignment_is_within_cluster_range() {
        let table = separated_table();
        for k in [2, 3] {
            let result = cluster_counties(&table, k, DEFAULT_SEED).expect("cluster");
            assert_eq!(result.assignments.len(), table.len());
            assert_eq!(result.k, k);
            for assignment in &result.assignments {
                assert!(assignment.cluster < k, "index {} >= k", assignment.cluster);
            }
        }
    }

    #[test]
    fn well_separated_groups_land_in_distinct_clusters() {
        let table = separated_table();
        let result = cluster_counties(&table, 2, DEFAULT_SEED).expect("cluster");

        let bay = result.assignments[0].cluster;
        let valley = result.assignments[3].cluster;
        assert_ne!(bay, valley, "the two groups must separate");
        for assignment in &result.assignments[..3] {
            assert_eq!(assignment.cluster, bay);
        }
        for assignment in &result.assignments[3..] {
            assert_eq!(assignment.cluster, valley);
        }
    }

    #[test]
    fn standardized_features_have_zero_mean_and_unit_variance() {
        let table = separated_table();
        let result = cluster_counties(&table, 2, DEFAULT_SEED).expect("cluster");

        for column in 0..2 {
            let n = result.standardized.len() as f64;
            let mean: f64 = result.standardized.iter().map(|row| row[column]).sum::<f64>() / n;
            let variance: f64 = result
                .standardized
                .iter()
                .map(|row| (row[column] - mean).powi(2))
                .sum::<f64>()
                / n;
            assert!(mean.abs() < 1e-9, "column {column} mean {mean}");
            assert!((variance - 1.0).abs() < 1e-9, "column {column} variance {variance}");
        }
    }
}
