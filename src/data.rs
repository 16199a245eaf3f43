//! CSV loading and column schema inference using Polars

use crate::error::{SentinelError, SentinelResult};
use crate::features::{
    engineer, AlignedRow, FeatureSchema, FieldValue, RawRecord, DAY_OF_WEEK, DROPPED_COLUMNS,
    ENGINEERED_COLUMNS, TIME_CONTINUOUS, TRANSACTION_DATE, TRANSACTION_TIME,
};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{error, info};

/// Engineered and aligned training rows with the schema they were laid out by
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub schema: FeatureSchema,
    pub rows: Vec<AlignedRow>,
}

/// Read a headered CSV file into a DataFrame
pub fn read_csv<P: AsRef<Path>>(path: P) -> SentinelResult<DataFrame> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    info!(path = %path.display(), rows = df.height(), columns = df.width(), "CSV loaded");
    Ok(df)
}

/// Convert every DataFrame row into a raw record. Numeric columns become
/// numbers, everything else text; nulls become missing.
pub fn frame_to_records(df: &DataFrame) -> SentinelResult<Vec<RawRecord>> {
    let mut records = vec![RawRecord::new(); df.height()];

    for series in df.get_columns() {
        let name = series.name();
        if series.dtype().is_numeric() {
            let values = series.cast(&DataType::Float64)?;
            for (record, value) in records.iter_mut().zip(values.f64()?.into_iter()) {
                record.set(name, value.map_or(FieldValue::Missing, FieldValue::Number));
            }
        } else {
            let values = series.cast(&DataType::String)?;
            for (record, value) in records.iter_mut().zip(values.str()?.into_iter()) {
                record.set(
                    name,
                    value.map_or(FieldValue::Missing, |s| FieldValue::Text(s.to_string())),
                );
            }
        }
    }

    Ok(records)
}

/// Derive the feature schema from column dtypes: numeric dtypes feed the
/// numeric branch, the rest the categorical branch. Dropped columns are
/// excluded and engineered columns are appended last.
pub fn infer_schema(df: &DataFrame) -> FeatureSchema {
    let mut expected = Vec::new();
    let mut numeric = Vec::new();

    for series in df.get_columns() {
        let name = series.name();
        if DROPPED_COLUMNS.contains(&name) || ENGINEERED_COLUMNS.contains(&name) {
            continue;
        }
        expected.push(name.to_string());
        if series.dtype().is_numeric() {
            numeric.push(name.to_string());
        }
    }

    let has = |column: &str| df.get_column_index(column).is_some();
    for (engineered, source) in [
        (TIME_CONTINUOUS, TRANSACTION_TIME),
        (DAY_OF_WEEK, TRANSACTION_DATE),
    ] {
        if has(engineered) || has(source) {
            expected.push(engineered.to_string());
            numeric.push(engineered.to_string());
        }
    }

    FeatureSchema::new(expected, numeric)
}

/// Load the raw training CSV, engineer features and align every row
pub fn load_training_data<P: AsRef<Path>>(path: P) -> SentinelResult<TrainingData> {
    let df = read_csv(path)?;
    if df.height() == 0 {
        return Err(SentinelError::EmptyDataset {
            context: "training CSV has no rows".to_string(),
        });
    }

    let schema = infer_schema(&df);
    if schema.expected_features.is_empty() {
        return Err(SentinelError::EmptyDataset {
            context: "training CSV has no feature columns".to_string(),
        });
    }

    let records = frame_to_records(&df)?;
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let row = engineer(record).and_then(|r| schema.align(&r)).map_err(|e| {
            error!(row = index, error = %e, "Training row rejected");
            e
        })?;
        rows.push(row);
    }

    info!(
        rows = rows.len(),
        numeric = ?schema.numeric_features,
        categorical = ?schema.categorical_features,
        "Training data prepared"
    );

    Ok(TrainingData { schema, rows })
}

/// Write a DataFrame to CSV with a header row
pub fn write_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> SentinelResult<()> {
    let path = path.as_ref();
    let mut file = File::create(path)
        .map_err(|e| SentinelError::io(format!("creating {}", path.display()), e))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!(path = %path.display(), rows = df.height(), "CSV written");
    Ok(())
}
