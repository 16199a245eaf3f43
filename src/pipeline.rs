//! Preprocessing and clustering composed into one fit/predict unit

use crate::error::{SentinelError, SentinelResult};
use crate::features::{engineer, AlignedRow, FeatureSchema, RawRecord};
use crate::model::{cluster_sizes, silhouette_sample, ClusterModel, ClusteringParams};
use crate::preprocess::Preprocessor;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Training-time settings for the whole pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub clustering: ClusteringParams,
    /// Neighbors used by the numeric KNN imputer
    pub n_neighbors: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            clustering: ClusteringParams::default(),
            n_neighbors: 5,
        }
    }
}

/// Fitted preprocessor + K-Means model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    model: ClusterModel,
}

/// Per-cluster statistics used to hand-derive the interpretation table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub share: f64,
    /// Mean of each raw numeric feature (before imputation), NaN ignored
    pub numeric_means: Vec<(String, f64)>,
    /// Most frequent observed value of each categorical feature
    pub dominant_categories: Vec<(String, Option<String>)>,
}

/// Diagnostics produced alongside a freshly fitted pipeline
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub rows: usize,
    pub labels: Array1<usize>,
    pub features: Array2<f64>,
    pub inertia: f64,
    pub silhouette: f64,
    pub clusters: Vec<ClusterSummary>,
}

const SILHOUETTE_SAMPLE: usize = 500;

impl Pipeline {
    /// Fit on engineered, schema-aligned training rows
    pub fn fit(
        schema: FeatureSchema,
        rows: &[AlignedRow],
        params: PipelineParams,
    ) -> SentinelResult<(Self, TrainingReport)> {
        let preprocessor = Preprocessor::fit(schema, rows, params.n_neighbors)?;
        let features = preprocessor.transform(rows)?;
        debug!(
            rows = features.nrows(),
            width = features.ncols(),
            "Preprocessed training matrix"
        );

        let (model, labels) = ClusterModel::fit(&features, params.clustering)?;
        let silhouette = silhouette_sample(&features, &labels, model.n_clusters, SILHOUETTE_SAMPLE);
        let clusters = summarize(preprocessor.schema(), rows, &labels, model.n_clusters);

        info!(
            clusters = model.n_clusters,
            inertia = model.inertia,
            silhouette,
            "Pipeline fitted"
        );

        let report = TrainingReport {
            rows: rows.len(),
            inertia: model.inertia,
            silhouette,
            clusters,
            labels,
            features,
        };

        Ok((
            Self {
                preprocessor,
                model,
            },
            report,
        ))
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.preprocessor.schema()
    }

    pub fn n_clusters(&self) -> usize {
        self.model.n_clusters
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Preprocessed feature matrix for aligned rows
    pub fn transform(&self, rows: &[AlignedRow]) -> SentinelResult<Array2<f64>> {
        self.preprocessor.transform(rows)
    }

    /// One cluster id per aligned row
    pub fn predict(&self, rows: &[AlignedRow]) -> SentinelResult<Vec<usize>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let features = self.transform(rows)?;
        Ok(self.model.predict(&features)?.to_vec())
    }

    /// Engineer, align and predict a single raw record
    pub fn predict_record(&self, record: &RawRecord) -> SentinelResult<usize> {
        let row = self.align_record(record)?;
        self.predict(std::slice::from_ref(&row))?
            .first()
            .copied()
            .ok_or_else(|| SentinelError::EmptyDataset {
                context: "prediction produced no cluster".to_string(),
            })
    }

    pub fn align_record(&self, record: &RawRecord) -> SentinelResult<AlignedRow> {
        self.schema().align(&engineer(record)?)
    }
}

fn summarize(
    schema: &FeatureSchema,
    rows: &[AlignedRow],
    labels: &Array1<usize>,
    n_clusters: usize,
) -> Vec<ClusterSummary> {
    let sizes = cluster_sizes(labels, n_clusters);
    let total = rows.len().max(1) as f64;

    (0..n_clusters)
        .map(|cluster| {
            let members: Vec<&AlignedRow> = rows
                .iter()
                .zip(labels.iter())
                .filter(|(_, &l)| l == cluster)
                .map(|(r, _)| r)
                .collect();

            let numeric_means = schema
                .numeric_features
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    let observed: Vec<f64> = members
                        .iter()
                        .map(|r| r.numeric[j])
                        .filter(|v| !v.is_nan())
                        .collect();
                    let mean = if observed.is_empty() {
                        f64::NAN
                    } else {
                        observed.iter().sum::<f64>() / observed.len() as f64
                    };
                    (name.clone(), mean)
                })
                .collect();

            let dominant_categories = schema
                .categorical_features
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                    for value in members.iter().filter_map(|r| r.categorical[j].as_deref()) {
                        *counts.entry(value).or_default() += 1;
                    }
                    let dominant = counts
                        .into_iter()
                        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                        .map(|(k, _)| k.to_string());
                    (name.clone(), dominant)
                })
                .collect();

            ClusterSummary {
                cluster,
                size: sizes[cluster],
                share: sizes[cluster] as f64 / total,
                numeric_means,
                dominant_categories,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["amount".into(), "tier".into()],
            vec!["amount".into()],
        )
    }

    fn rows() -> Vec<AlignedRow> {
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(AlignedRow {
                numeric: vec![10.0 + i as f64],
                categorical: vec![Some("Bronze".into())],
            });
            rows.push(AlignedRow {
                numeric: vec![900.0 + i as f64],
                categorical: vec![Some("Gold".into())],
            });
        }
        rows
    }

    fn params() -> PipelineParams {
        PipelineParams {
            clustering: ClusteringParams {
                n_clusters: 2,
                ..ClusteringParams::default()
            },
            n_neighbors: 3,
        }
    }

    #[test]
    fn test_fit_and_summary() {
        let (pipeline, report) = Pipeline::fit(schema(), &rows(), params()).unwrap();
        assert_eq!(pipeline.n_clusters(), 2);
        assert_eq!(report.rows, 12);
        assert_eq!(report.clusters.iter().map(|c| c.size).sum::<usize>(), 12);

        let gold = report
            .clusters
            .iter()
            .find(|c| c.dominant_categories[0].1.as_deref() == Some("Gold"))
            .unwrap();
        assert_eq!(gold.size, 6);
        assert!(gold.numeric_means[0].1 > 900.0);
    }

    #[test]
    fn test_predict_handles_missing_and_unknown() {
        let (pipeline, _) = Pipeline::fit(schema(), &rows(), params()).unwrap();
        let odd = vec![
            AlignedRow {
                numeric: vec![f64::NAN],
                categorical: vec![Some("Platinum".into())],
            },
            AlignedRow {
                numeric: vec![905.0],
                categorical: vec![None],
            },
        ];
        let clusters = pipeline.predict(&odd).unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|&c| c < 2));
    }

    #[test]
    fn test_predict_record_matches_rows() {
        let (pipeline, report) = Pipeline::fit(schema(), &rows(), params()).unwrap();
        let record = RawRecord::new()
            .with("amount", crate::features::FieldValue::Number(902.0))
            .with("tier", crate::features::FieldValue::Text("Gold".into()));
        assert_eq!(pipeline.predict_record(&record).unwrap(), report.labels[1]);
    }

    #[test]
    fn test_predict_empty() {
        let (pipeline, _) = Pipeline::fit(schema(), &rows(), params()).unwrap();
        assert!(pipeline.predict(&[]).unwrap().is_empty());
    }
}
