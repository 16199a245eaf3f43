//! Feature engineering shared by training and inference
//!
//! Every record, whether it comes from the training CSV, an uploaded file,
//! CLI flags or a JSON body, goes through [`engineer`] and then
//! [`FeatureSchema::align`]. Keeping a single code path is what guarantees
//! that inference sees exactly the columns the pipeline was fitted on.

use crate::error::{SentinelError, SentinelResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PURCHASE_AMOUNT: &str = "Purchase_Amount";
pub const CUSTOMER_AGE: &str = "Customer_Age";
pub const FOOTFALL_COUNT: &str = "Footfall_Count";
pub const LOYALTY_TIER: &str = "Customer_Loyalty_Tier";
pub const PAYMENT_METHOD: &str = "Payment_Method";
pub const PRODUCT_CATEGORY: &str = "Product_Category";
pub const TIME_CONTINUOUS: &str = "Time_Continuous";
pub const DAY_OF_WEEK: &str = "Day_of_Week";
pub const TRANSACTION_TIME: &str = "Transaction_Time";
pub const TRANSACTION_DATE: &str = "Transaction_Date";

/// Identifier, label and raw timestamp columns never fed to the pipeline
pub const DROPPED_COLUMNS: [&str; 6] = [
    "Transaction_ID",
    "Customer_ID",
    "Fraud_Flag",
    "IP_Address",
    TRANSACTION_DATE,
    TRANSACTION_TIME,
];

/// Columns produced by feature engineering, appended after the raw ones
pub const ENGINEERED_COLUMNS: [&str; 2] = [TIME_CONTINUOUS, DAY_OF_WEEK];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A single raw cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    fn from_json(column: &str, value: &serde_json::Value) -> SentinelResult<Self> {
        match value {
            serde_json::Value::Null => Ok(FieldValue::Missing),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .ok_or_else(|| SentinelError::schema(column, "number is not representable as f64")),
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            other => Err(SentinelError::schema(
                column,
                format!("unsupported JSON value {other}"),
            )),
        }
    }
}

/// A raw transaction keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: FieldValue) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: FieldValue) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Build a record from a flat JSON object
    pub fn from_json(value: &serde_json::Value) -> SentinelResult<Self> {
        let object = value.as_object().ok_or_else(|| SentinelError::InvalidPayload {
            reason: "expected a JSON object of transaction fields".to_string(),
        })?;

        let mut record = RawRecord::new();
        for (column, value) in object {
            record.set(column, FieldValue::from_json(column, value)?);
        }
        Ok(record)
    }

    /// Numeric view of a column, if present and parseable
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.fields.get(column)? {
            FieldValue::Number(v) if v.is_finite() => Some(*v),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

/// Discrete inputs collected by the single-record form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    pub purchase_amount: f64,
    pub customer_age: i64,
    pub footfall_count: i64,
    pub loyalty_tier: String,
    pub payment_method: String,
    pub product_category: String,
    pub hour: f64,
    pub day_of_week: u32,
}

impl TransactionInput {
    pub fn to_record(&self) -> RawRecord {
        RawRecord::new()
            .with(PURCHASE_AMOUNT, FieldValue::Number(self.purchase_amount))
            .with(CUSTOMER_AGE, FieldValue::Number(self.customer_age as f64))
            .with(FOOTFALL_COUNT, FieldValue::Number(self.footfall_count as f64))
            .with(TIME_CONTINUOUS, FieldValue::Number(self.hour))
            .with(DAY_OF_WEEK, FieldValue::Number(self.day_of_week as f64))
            .with(LOYALTY_TIER, FieldValue::Text(self.loyalty_tier.clone()))
            .with(PAYMENT_METHOD, FieldValue::Text(self.payment_method.clone()))
            .with(PRODUCT_CATEGORY, FieldValue::Text(self.product_category.clone()))
    }
}

/// Convert `HH:MM:SS` into fractional hours: `hour + minute / 60`
pub fn time_continuous(value: &str) -> SentinelResult<f64> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M:%S").map_err(|_| {
        SentinelError::InvalidTime {
            value: value.to_string(),
        }
    })?;
    Ok(time.hour() as f64 + time.minute() as f64 / 60.0)
}

/// Zero-based weekday of a calendar date, Monday = 0
pub fn day_of_week(value: &str) -> SentinelResult<u32> {
    let trimmed = value.trim();
    let date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
        .ok_or_else(|| SentinelError::InvalidDate {
            value: value.to_string(),
        })?;
    Ok(date.weekday().num_days_from_monday())
}

fn text_of<'a>(column: &str, value: &'a FieldValue) -> SentinelResult<Option<&'a str>> {
    match value {
        FieldValue::Text(s) if s.trim().is_empty() => Ok(None),
        FieldValue::Text(s) => Ok(Some(s.as_str())),
        FieldValue::Missing => Ok(None),
        FieldValue::Number(_) => Err(SentinelError::schema(column, "expected a string")),
    }
}

/// Derive `Time_Continuous` / `Day_of_Week` and drop non-feature columns.
///
/// Raw timestamps take precedence over engineered values supplied by the
/// caller.
pub fn engineer(record: &RawRecord) -> SentinelResult<RawRecord> {
    let mut out = RawRecord::new();
    for (column, value) in &record.fields {
        if !DROPPED_COLUMNS.contains(&column.as_str()) {
            out.set(column, value.clone());
        }
    }

    if let Some(raw) = record.get(TRANSACTION_TIME) {
        if let Some(time) = text_of(TRANSACTION_TIME, raw)? {
            out.set(TIME_CONTINUOUS, FieldValue::Number(time_continuous(time)?));
        }
    }
    if let Some(raw) = record.get(TRANSACTION_DATE) {
        if let Some(date) = text_of(TRANSACTION_DATE, raw)? {
            out.set(DAY_OF_WEEK, FieldValue::Number(day_of_week(date)? as f64));
        }
    }

    Ok(out)
}

/// One record laid out in training column order
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    /// Numeric features, NaN where missing
    pub numeric: Vec<f64>,
    /// Categorical features, `None` where missing
    pub categorical: Vec<Option<String>>,
}

/// Column layout fixed at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Every feature in training order
    pub expected_features: Vec<String>,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
}

impl FeatureSchema {
    pub fn new(expected_features: Vec<String>, numeric_features: Vec<String>) -> Self {
        let categorical_features = expected_features
            .iter()
            .filter(|c| !numeric_features.contains(c))
            .cloned()
            .collect();
        let numeric_features = expected_features
            .iter()
            .filter(|c| numeric_features.contains(c))
            .cloned()
            .collect();
        Self {
            expected_features,
            numeric_features,
            categorical_features,
        }
    }

    /// Lay out an engineered record, filling absent columns with the missing
    /// sentinel. Columns outside the schema are ignored.
    pub fn align(&self, record: &RawRecord) -> SentinelResult<AlignedRow> {
        let mut numeric = Vec::with_capacity(self.numeric_features.len());
        for column in &self.numeric_features {
            let value = match record.get(column) {
                None | Some(FieldValue::Missing) => f64::NAN,
                Some(FieldValue::Number(v)) => *v,
                Some(FieldValue::Text(s)) if s.trim().is_empty() => f64::NAN,
                Some(FieldValue::Text(s)) => s.trim().parse::<f64>().map_err(|_| {
                    SentinelError::schema(column, format!("'{s}' is not numeric"))
                })?,
            };
            // NaN is the missing marker; only infinities are rejected here
            if value.is_infinite() {
                return Err(SentinelError::schema(column, "value is not a finite number"));
            }
            numeric.push(value);
        }

        let mut categorical = Vec::with_capacity(self.categorical_features.len());
        for column in &self.categorical_features {
            let value = match record.get(column) {
                None | Some(FieldValue::Missing) => None,
                Some(FieldValue::Text(s)) if s.trim().is_empty() => None,
                Some(FieldValue::Text(s)) => Some(s.clone()),
                Some(FieldValue::Number(v)) => Some(v.to_string()),
            };
            categorical.push(value);
        }

        Ok(AlignedRow {
            numeric,
            categorical,
        })
    }

    /// Number of schema columns present in a record
    pub fn overlap(&self, record: &RawRecord) -> usize {
        self.expected_features
            .iter()
            .filter(|c| record.contains(c))
            .count()
    }
}
