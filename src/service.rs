//! Scoring service: the loaded artifact plus its interpretation table
//!
//! Built once at startup and handed to every surface (CLI, batch, HTTP).

use crate::artifact::PipelineArtifact;
use crate::error::{SentinelError, SentinelResult};
use crate::features::{engineer, AlignedRow, RawRecord, CUSTOMER_AGE};
use crate::risk::{RiskTable, Verdict};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

pub struct ScoringService {
    artifact: PipelineArtifact,
    risk: RiskTable,
}

/// Per-row outcomes of a batch plus the preprocessed rows that were clustered
#[derive(Debug)]
pub struct BatchScore {
    pub outcomes: Vec<SentinelResult<Verdict>>,
    /// Preprocessed features of the rows that received a cluster
    pub features: Array2<f64>,
    /// Cluster of each row of `features`
    pub clusters: Vec<usize>,
}

enum Screened {
    Done(SentinelResult<Verdict>),
    Pending(AlignedRow),
}

impl ScoringService {
    pub fn new(artifact: PipelineArtifact, risk: RiskTable) -> Self {
        Self { artifact, risk }
    }

    /// Load the artifact from disk; a missing file is an error the caller
    /// must treat as fatal
    pub fn load<P: AsRef<Path>>(path: P, risk: RiskTable) -> SentinelResult<Self> {
        let artifact = PipelineArtifact::load(path)?;
        let n_clusters = artifact.pipeline.n_clusters();
        let unmapped: Vec<usize> = (0..n_clusters)
            .filter(|c| !risk.clusters.iter().any(|p| p.id == *c))
            .collect();
        if !unmapped.is_empty() {
            warn!(?unmapped, "Clusters without an interpretation will be reported as Unclassified");
        }
        Ok(Self::new(artifact, risk))
    }

    pub fn artifact(&self) -> &PipelineArtifact {
        &self.artifact
    }

    fn screen(&self, record: &RawRecord) -> SentinelResult<Screened> {
        let engineered = engineer(record)?;
        if let Some(verdict) = self.risk.screen_age(engineered.number(CUSTOMER_AGE)) {
            return Ok(Screened::Done(Ok(verdict)));
        }
        let row = self.artifact.pipeline.schema().align(&engineered)?;
        Ok(Screened::Pending(row))
    }

    /// Score one raw record
    pub fn assess(&self, record: &RawRecord) -> SentinelResult<Verdict> {
        match self.screen(record)? {
            Screened::Done(verdict) => verdict,
            Screened::Pending(row) => {
                let cluster = self
                    .artifact
                    .pipeline
                    .predict(std::slice::from_ref(&row))?
                    .first()
                    .copied()
                    .ok_or_else(|| SentinelError::EmptyDataset {
                        context: "prediction produced no cluster".to_string(),
                    })?;
                debug!(cluster, "Record scored");
                Ok(self.risk.interpret(cluster))
            }
        }
    }

    /// Score many records. Record-level failures stay in their row; a batch
    /// sharing no column with the training schema fails as a whole.
    pub fn score_records(&self, records: &[RawRecord]) -> SentinelResult<BatchScore> {
        let schema = self.artifact.pipeline.schema();
        let engineered_overlap = records
            .iter()
            .filter_map(|r| engineer(r).ok())
            .map(|r| schema.overlap(&r))
            .collect::<Vec<_>>();
        if !engineered_overlap.is_empty() && engineered_overlap.iter().all(|&n| n == 0) {
            return Err(SentinelError::schema(
                "upload",
                format!(
                    "none of the expected features {:?} are present",
                    schema.expected_features
                ),
            ));
        }

        let mut outcomes: Vec<Option<SentinelResult<Verdict>>> = Vec::with_capacity(records.len());
        let mut pending_rows = Vec::new();
        let mut pending_index = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match self.screen(record) {
                Ok(Screened::Done(verdict)) => outcomes.push(Some(verdict)),
                Ok(Screened::Pending(row)) => {
                    pending_rows.push(row);
                    pending_index.push(index);
                    outcomes.push(None);
                }
                Err(e) => {
                    debug!(row = index, error = %e, "Row rejected");
                    outcomes.push(Some(Err(e)));
                }
            }
        }

        let transformed = self.artifact.pipeline.transform(&pending_rows)?;
        let model = self.artifact.pipeline.model();
        let mut kept = Vec::with_capacity(pending_index.len());
        let mut clusters = Vec::with_capacity(pending_index.len());
        for (position, (&index, row)) in pending_index
            .iter()
            .zip(transformed.outer_iter())
            .enumerate()
        {
            match model.predict_one(&row) {
                Ok(cluster) => {
                    outcomes[index] = Some(Ok(self.risk.interpret(cluster)));
                    kept.push(position);
                    clusters.push(cluster);
                }
                Err(e) => {
                    debug!(row = index, error = %e, "Row rejected");
                    outcomes[index] = Some(Err(e));
                }
            }
        }
        let features = transformed.select(Axis(0), &kept);

        let outcomes = outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| {
                    Err(SentinelError::EmptyDataset {
                        context: "row was not scored".to_string(),
                    })
                })
            })
            .collect();

        Ok(BatchScore {
            outcomes,
            features,
            clusters,
        })
    }
}

impl BatchScore {
    pub fn scored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.scored()
    }

    /// Append `Cluster`, `Risk_Label`, `Risk_Level` and `Note` columns
    pub fn annotate(&self, df: &mut DataFrame) -> SentinelResult<()> {
        if df.height() != self.outcomes.len() {
            return Err(SentinelError::schema(
                "upload",
                format!(
                    "frame has {} rows but {} outcomes were produced",
                    df.height(),
                    self.outcomes.len()
                ),
            ));
        }

        let clusters: Vec<Option<u32>> = self
            .outcomes
            .iter()
            .map(|o| o.as_ref().ok().and_then(Verdict::cluster).map(|c| c as u32))
            .collect();
        let labels: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match o {
                Ok(v) => v.label().to_string(),
                Err(_) => "Error".to_string(),
            })
            .collect();
        let levels: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match o {
                Ok(v) => v.risk_level().to_string(),
                Err(_) => String::new(),
            })
            .collect();
        let notes: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match o {
                Ok(Verdict::ManualReview { reason }) => reason.clone(),
                Ok(Verdict::Clustered { .. }) => String::new(),
                Err(e) => e.to_string(),
            })
            .collect();

        df.with_column(Series::new("Cluster", clusters))?;
        df.with_column(Series::new("Risk_Label", labels))?;
        df.with_column(Series::new("Risk_Level", levels))?;
        df.with_column(Series::new("Note", notes))?;
        Ok(())
    }
}
