//! Column-wise preprocessing: KNN imputation and standardization for numeric
//! columns, most-frequent imputation and one-hot encoding for categorical ones

use crate::error::{SentinelError, SentinelResult};
use crate::features::{AlignedRow, FeatureSchema};
use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fills NaN cells with the mean of the `n_neighbors` closest training rows
/// that have the cell, using nan-euclidean distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnImputer {
    n_neighbors: usize,
    fit_x: Array2<f64>,
    /// Fallback when no donor row exists
    column_means: Array1<f64>,
}

impl KnnImputer {
    pub fn fit(x: &Array2<f64>, n_neighbors: usize) -> SentinelResult<Self> {
        if n_neighbors == 0 {
            return Err(SentinelError::Training {
                reason: "KNN imputer needs at least one neighbor".to_string(),
            });
        }
        if x.nrows() == 0 {
            return Err(SentinelError::EmptyDataset {
                context: "KNN imputer fit".to_string(),
            });
        }

        let column_means = x
            .columns()
            .into_iter()
            .map(|col| {
                let (sum, count) = col
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                // Columns with no observed value impute to zero
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            })
            .collect::<Array1<f64>>();

        Ok(Self {
            n_neighbors,
            fit_x: x.clone(),
            column_means,
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> SentinelResult<Array2<f64>> {
        if x.ncols() != self.fit_x.ncols() {
            return Err(SentinelError::schema(
                "numeric block",
                format!(
                    "expected {} numeric columns, got {}",
                    self.fit_x.ncols(),
                    x.ncols()
                ),
            ));
        }

        let mut out = x.clone();
        for (i, row) in x.outer_iter().enumerate() {
            if !row.iter().any(|v| v.is_nan()) {
                continue;
            }

            let distances: Vec<f64> = self
                .fit_x
                .outer_iter()
                .map(|donor| nan_euclidean(&row, &donor))
                .collect();

            for (j, value) in row.iter().enumerate() {
                if value.is_nan() {
                    out[[i, j]] = self.impute_cell(&distances, j);
                }
            }
        }
        Ok(out)
    }

    fn impute_cell(&self, distances: &[f64], column: usize) -> f64 {
        let mut donors: Vec<(f64, f64)> = distances
            .iter()
            .zip(self.fit_x.column(column).iter())
            .filter(|(d, v)| d.is_finite() && !v.is_nan())
            .map(|(d, v)| (*d, *v))
            .collect();

        if donors.is_empty() {
            return self.column_means[column];
        }

        donors.sort_by(|a, b| a.0.total_cmp(&b.0));
        let take = donors.len().min(self.n_neighbors);
        donors[..take].iter().map(|(_, v)| v).sum::<f64>() / take as f64
    }
}

/// Euclidean distance over coordinates present in both rows, scaled up by
/// the share of coordinates present. `INFINITY` when nothing overlaps.
fn nan_euclidean(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.is_nan() && !y.is_nan() {
            sum += (x - y).powi(2);
            present += 1;
        }
    }
    if present == 0 {
        return f64::INFINITY;
    }
    (sum * a.len() as f64 / present as f64).sqrt()
}

/// Zero-mean, unit-variance scaling fitted with linfa's standard scaler.
/// Constant columns keep unit scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    inner: LinearScaler<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> SentinelResult<Self> {
        let dataset = Dataset::new(x.clone(), Array1::<usize>::zeros(x.nrows()));
        let inner = LinearScaler::standard()
            .fit(&dataset)
            .map_err(|e| SentinelError::Training {
                reason: format!("standard scaler: {e}"),
            })?;
        Ok(Self { inner })
    }

    pub fn mean(&self) -> &Array1<f64> {
        self.inner.offsets()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        self.inner.transform(x.clone())
    }
}

/// Replaces missing categories with the most frequent training value.
/// Ties go to the lexicographically smallest category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostFrequentImputer {
    fill: Vec<Option<String>>,
}

impl MostFrequentImputer {
    pub fn fit(rows: &[Vec<Option<String>>], n_columns: usize) -> Self {
        let fill = (0..n_columns)
            .map(|j| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for row in rows {
                    if let Some(Some(value)) = row.get(j) {
                        *counts.entry(value.as_str()).or_default() += 1;
                    }
                }
                // BTreeMap iterates in key order so the first maximum wins
                counts
                    .iter()
                    .fold(None::<(&str, usize)>, |best, (&k, &c)| match best {
                        Some((_, bc)) if bc >= c => best,
                        _ => Some((k, c)),
                    })
                    .map(|(k, _)| k.to_string())
            })
            .collect();
        Self { fill }
    }

    pub fn transform(&self, rows: &[Vec<Option<String>>]) -> Vec<Vec<Option<String>>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.fill.iter())
                    .map(|(value, fill)| value.clone().or_else(|| fill.clone()))
                    .collect()
            })
            .collect()
    }

    pub fn fill_values(&self) -> &[Option<String>] {
        &self.fill
    }
}

/// One binary column per known category; unseen values encode as all zeros
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit(rows: &[Vec<Option<String>>], n_columns: usize) -> Self {
        let categories = (0..n_columns)
            .map(|j| {
                rows.iter()
                    .filter_map(|row| row.get(j).cloned().flatten())
                    .collect::<BTreeSet<String>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        Self { categories }
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    pub fn transform(&self, rows: &[Vec<Option<String>>]) -> Array2<f64> {
        let mut out = Array2::zeros((rows.len(), self.width()));
        for (i, row) in rows.iter().enumerate() {
            let mut offset = 0;
            for (j, known) in self.categories.iter().enumerate() {
                if let Some(Some(value)) = row.get(j) {
                    if let Ok(pos) = known.binary_search(value) {
                        out[[i, offset + pos]] = 1.0;
                    }
                }
                offset += known.len();
            }
        }
        out
    }
}

/// Fitted column transformer: numeric block followed by categorical block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: FeatureSchema,
    numeric_imputer: KnnImputer,
    scaler: StandardScaler,
    categorical_imputer: MostFrequentImputer,
    encoder: OneHotEncoder,
}

impl Preprocessor {
    pub fn fit(
        schema: FeatureSchema,
        rows: &[AlignedRow],
        n_neighbors: usize,
    ) -> SentinelResult<Self> {
        if rows.is_empty() {
            return Err(SentinelError::EmptyDataset {
                context: "preprocessor fit".to_string(),
            });
        }

        let numeric = numeric_matrix(&schema, rows)?;
        let numeric_imputer = KnnImputer::fit(&numeric, n_neighbors)?;
        let scaler = StandardScaler::fit(&numeric_imputer.transform(&numeric)?)?;

        let categorical: Vec<Vec<Option<String>>> =
            rows.iter().map(|r| r.categorical.clone()).collect();
        let n_cat = schema.categorical_features.len();
        let categorical_imputer = MostFrequentImputer::fit(&categorical, n_cat);
        let encoder = OneHotEncoder::fit(&categorical_imputer.transform(&categorical), n_cat);

        Ok(Self {
            schema,
            numeric_imputer,
            scaler,
            categorical_imputer,
            encoder,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn output_width(&self) -> usize {
        self.schema.numeric_features.len() + self.encoder.width()
    }

    /// Output column names in `num__<col>` / `cat__<col>_<value>` form
    pub fn output_feature_names(&self) -> Vec<String> {
        let numeric = self
            .schema
            .numeric_features
            .iter()
            .map(|c| format!("num__{c}"));
        let categorical = self
            .schema
            .categorical_features
            .iter()
            .zip(self.encoder.categories())
            .flat_map(|(c, values)| values.iter().map(move |v| format!("cat__{c}_{v}")));
        numeric.chain(categorical).collect()
    }

    pub fn transform(&self, rows: &[AlignedRow]) -> SentinelResult<Array2<f64>> {
        let numeric = numeric_matrix(&self.schema, rows)?;
        let numeric = self
            .scaler
            .transform(&self.numeric_imputer.transform(&numeric)?);

        let categorical: Vec<Vec<Option<String>>> =
            rows.iter().map(|r| r.categorical.clone()).collect();
        let encoded = self
            .encoder
            .transform(&self.categorical_imputer.transform(&categorical));

        concatenate(Axis(1), &[numeric.view(), encoded.view()]).map_err(|e| {
            SentinelError::schema("feature matrix", format!("cannot join blocks: {e}"))
        })
    }
}

fn numeric_matrix(schema: &FeatureSchema, rows: &[AlignedRow]) -> SentinelResult<Array2<f64>> {
    let width = schema.numeric_features.len();
    let mut flat = Vec::with_capacity(rows.len() * width);
    for row in rows {
        if row.numeric.len() != width {
            return Err(SentinelError::schema(
                "numeric block",
                format!("expected {width} values, got {}", row.numeric.len()),
            ));
        }
        flat.extend_from_slice(&row.numeric);
    }
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| SentinelError::schema("numeric block", e.to_string()))
}
