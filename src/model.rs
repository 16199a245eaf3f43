//! K-Means clustering model implementation

use crate::error::{SentinelError, SentinelResult};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Hyperparameters for fitting the clustering stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// Fitted K-Means centroids with training diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster centroids in preprocessed space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia) on training data
    pub inertia: f64,
    /// Parameters the model was fitted with
    pub params: ClusteringParams,
}

impl ClusterModel {
    /// Fit K-Means on preprocessed features, returning the model and the
    /// training assignments
    pub fn fit(
        features: &Array2<f64>,
        params: ClusteringParams,
    ) -> SentinelResult<(Self, Array1<usize>)> {
        if params.n_clusters < 2 {
            return Err(SentinelError::Training {
                reason: format!("need at least 2 clusters, got {}", params.n_clusters),
            });
        }

        if features.nrows() < params.n_clusters {
            return Err(SentinelError::Training {
                reason: format!(
                    "Number of data points ({}) must be at least equal to number of clusters ({})",
                    features.nrows(),
                    params.n_clusters
                ),
            });
        }

        let n_samples = features.nrows();
        let targets: Array1<usize> = Array1::zeros(n_samples);
        let dataset = Dataset::new(features.clone(), targets);

        let rng = Xoshiro256Plus::seed_from_u64(params.seed);
        let fitted = KMeans::params_with(params.n_clusters, rng, L2Dist)
            .max_n_iterations(params.max_iters)
            .tolerance(params.tolerance)
            .fit(&dataset)
            .map_err(|e| SentinelError::Training {
                reason: e.to_string(),
            })?;

        let mut model = ClusterModel {
            n_clusters: params.n_clusters,
            centroids: fitted.centroids().clone(),
            inertia: 0.0,
            params,
        };
        let labels = model.predict(features)?;
        model.inertia = compute_inertia(features, &labels, &model.centroids);

        Ok((model, labels))
    }

    /// Nearest centroid for one preprocessed row; ties go to the lower id.
    /// Fails when no centroid distance is finite.
    pub fn predict_one(&self, features: &ArrayView1<'_, f64>) -> SentinelResult<usize> {
        let mut closest: Option<(usize, f64)> = None;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(features, &centroid);
            if !distance.is_finite() {
                continue;
            }
            if closest.map_or(true, |(_, best)| distance < best) {
                closest = Some((cluster_idx, distance));
            }
        }

        closest
            .map(|(cluster, _)| cluster)
            .ok_or_else(|| SentinelError::NonFiniteFeatures {
                reason: "no centroid is at a finite distance".to_string(),
            })
    }

    pub fn predict(&self, features: &Array2<f64>) -> SentinelResult<Array1<usize>> {
        features
            .outer_iter()
            .map(|row| self.predict_one(&row))
            .collect()
    }
}

/// Count of rows per cluster
pub fn cluster_sizes(labels: &Array1<usize>, n_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_clusters];
    for &label in labels.iter() {
        if label < n_clusters {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Mean silhouette coefficient over the first `sample_size` rows
pub fn silhouette_sample(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    n_clusters: usize,
    sample_size: usize,
) -> f64 {
    let n_samples = features.nrows().min(sample_size);
    if n_samples < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }

            let distance = euclidean_distance(&point, &features.row(j));
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_distances.push(distance);
            } else if other_label < n_clusters {
                other_cluster_distances[other_label].push(distance);
            }
        }

        let a_i = if same_cluster_distances.is_empty() {
            0.0
        } else {
            same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
        };

        let b_i = other_cluster_distances
            .iter()
            .filter(|distances| !distances.is_empty())
            .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };

        silhouette_sum += silhouette_i;
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| euclidean_distance(&features.row(i), &centroids.row(cluster)).powi(2))
        .sum()
}

fn euclidean_distance(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Array2<f64> {
        Array2::from_shape_vec(
            (8, 2),
            vec![
                0.0, 0.0, 0.1, 0.1, -0.1, 0.0, 0.0, -0.1, // near origin
                5.0, 5.0, 5.1, 5.0, 4.9, 5.1, 5.0, 4.9, // near (5, 5)
            ],
        )
        .unwrap()
    }

    fn params(k: usize) -> ClusteringParams {
        ClusteringParams {
            n_clusters: k,
            ..ClusteringParams::default()
        }
    }

    #[test]
    fn test_fit_separates_blobs() {
        let (model, labels) = ClusterModel::fit(&blobs(), params(2)).unwrap();
        assert_eq!(model.centroids.shape(), &[2, 2]);
        assert_eq!(labels.len(), 8);
        assert!(labels.iter().take(4).all(|&l| l == labels[0]));
        assert!(labels.iter().skip(4).all(|&l| l == labels[4]));
        assert_ne!(labels[0], labels[4]);
        assert!(model.inertia.is_finite() && model.inertia >= 0.0);
    }

    #[test]
    fn test_fit_is_reproducible_with_seed() {
        let (a, _) = ClusterModel::fit(&blobs(), params(3)).unwrap();
        let (b, _) = ClusterModel::fit(&blobs(), params(3)).unwrap();
        assert_eq!(a.centroids, b.centroids);
    }

    #[test]
    fn test_cluster_sizes() {
        let (model, labels) = ClusterModel::fit(&blobs(), params(2)).unwrap();
        let sizes = cluster_sizes(&labels, model.n_clusters);
        assert_eq!(sizes.iter().sum::<usize>(), 8);
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn test_silhouette_well_separated() {
        let (model, labels) = ClusterModel::fit(&blobs(), params(2)).unwrap();
        let score = silhouette_sample(&blobs(), &labels, model.n_clusters, 100);
        assert!(score > 0.9);
    }

    #[test]
    fn test_predict_rejects_overflowing_row() {
        let (model, _) = ClusterModel::fit(&blobs(), params(2)).unwrap();
        let huge = Array2::from_shape_vec((1, 2), vec![1e308, 0.0]).unwrap();
        assert!(matches!(
            model.predict(&huge),
            Err(SentinelError::NonFiniteFeatures { .. })
        ));

        let infinite = Array2::from_shape_vec((1, 2), vec![f64::NEG_INFINITY, 0.0]).unwrap();
        assert!(model.predict(&infinite).is_err());
    }

    #[test]
    fn test_invalid_cluster_count() {
        assert!(ClusterModel::fit(&blobs(), params(1)).is_err());
        assert!(ClusterModel::fit(&blobs(), params(9)).is_err());
    }
}
