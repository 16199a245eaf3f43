//! Integration tests for Fraud Sentinel

use fraud_sentinel::data::{frame_to_records, load_training_data, read_csv};
use fraud_sentinel::features::FieldValue;
use fraud_sentinel::model::ClusteringParams;
use fraud_sentinel::{
    ArtifactMetadata, Pipeline, PipelineArtifact, PipelineParams, RawRecord, RiskTable,
    ScoringService, SentinelError, TransactionInput, Verdict,
};
use chrono::Utc;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "Transaction_ID,Customer_ID,Transaction_Date,Transaction_Time,Customer_Age,Customer_Loyalty_Tier,Payment_Method,Product_Category,Purchase_Amount,Footfall_Count,IP_Address,Fraud_Flag";

/// Four behavioral groups with a few missing footfall counts
fn create_training_csv(rows: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();

    let categories = ["Skincare", "Fragrance", "Makeup"];
    for i in 0..rows {
        let (amount, hour, tier, payment) = match i % 4 {
            0 => (80 + (i % 7) * 5, 13, "Silver", "Credit Card"),
            1 => (4500 + (i % 5) * 100, 15, "Platinum", "Crypto"),
            2 => (300 + (i % 6) * 10, 2, "Bronze", "Cash"),
            _ => (900 + (i % 4) * 20, 11, "Gold", "PayPal"),
        };
        let age = 20 + (i * 7) % 50;
        let footfall = if i % 11 == 5 {
            String::new()
        } else {
            (20 + (i * 3) % 60).to_string()
        };
        writeln!(
            file,
            "T{i},C{i},2025-01-{:02},{:02}:{:02}:00,{},{},{},{},{}.0,{},10.0.0.{},{}",
            1 + i % 28,
            hour,
            (i * 13) % 60,
            age,
            tier,
            payment,
            categories[i % 3],
            amount,
            footfall,
            i % 250,
            i % 2
        )
        .unwrap();
    }
    file
}

fn params() -> PipelineParams {
    PipelineParams {
        clustering: ClusteringParams {
            n_clusters: 4,
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
        },
        n_neighbors: 5,
    }
}

fn train(file: &NamedTempFile) -> PipelineArtifact {
    let data = load_training_data(file.path()).unwrap();
    let (pipeline, report) = Pipeline::fit(data.schema, &data.rows, params()).unwrap();
    PipelineArtifact::new(
        pipeline,
        ArtifactMetadata {
            trained_at: Utc::now(),
            training_rows: report.rows,
            source: "synthetic".to_string(),
            params: params(),
        },
    )
}

fn service(file: &NamedTempFile) -> ScoringService {
    ScoringService::new(train(file), RiskTable::default())
}

fn reference_record() -> RawRecord {
    RawRecord::from_json(&serde_json::json!({
        "Purchase_Amount": 500,
        "Customer_Age": 30,
        "Footfall_Count": 50,
        "Customer_Loyalty_Tier": "Gold",
        "Payment_Method": "Credit Card",
        "Product_Category": "Skincare",
        "Time_Continuous": 14,
        "Day_of_Week": 2
    }))
    .unwrap()
}

fn clustered(verdict: &Verdict) -> usize {
    verdict.cluster().expect("expected a cluster assignment")
}

#[test]
fn test_end_to_end_training() {
    let file = create_training_csv(80);
    let data = load_training_data(file.path()).unwrap();
    assert_eq!(data.rows.len(), 80);
    assert_eq!(
        data.schema.expected_features,
        vec![
            "Customer_Age",
            "Customer_Loyalty_Tier",
            "Payment_Method",
            "Product_Category",
            "Purchase_Amount",
            "Footfall_Count",
            "Time_Continuous",
            "Day_of_Week",
        ]
    );

    let (pipeline, report) = Pipeline::fit(data.schema, &data.rows, params()).unwrap();
    assert_eq!(pipeline.n_clusters(), 4);
    assert_eq!(report.labels.len(), 80);
    assert!(report.labels.iter().all(|&l| l < 4));
    assert_eq!(report.clusters.iter().map(|c| c.size).sum::<usize>(), 80);
    assert!(report.inertia.is_finite() && report.inertia >= 0.0);

    // 5 numeric columns + 4 tiers + 4 payment methods + 3 categories
    assert_eq!(pipeline.preprocessor().output_width(), 16);
}

#[test]
fn test_fixed_record_is_reproducible_across_runs() {
    let file = create_training_csv(80);
    let first = service(&file).assess(&reference_record()).unwrap();
    let second = service(&file).assess(&reference_record()).unwrap();
    assert_eq!(clustered(&first), clustered(&second));
    assert!(clustered(&first) < 4);
}

#[test]
fn test_predict_is_deterministic_on_loaded_artifact() {
    let file = create_training_csv(80);
    let dir = tempdir().unwrap();
    let path = dir.path().join("fraud_detection_model.bin");

    let artifact = train(&file);
    let before = ScoringService::new(artifact.clone(), RiskTable::default())
        .assess(&reference_record())
        .unwrap();
    artifact.save(&path).unwrap();

    let loaded = ScoringService::load(&path, RiskTable::default()).unwrap();
    let results: Vec<usize> = (0..5)
        .map(|_| clustered(&loaded.assess(&reference_record()).unwrap()))
        .collect();
    assert!(results.iter().all(|&c| c == clustered(&before)));
}

#[test]
fn test_age_guard_overrides_model() {
    let file = create_training_csv(40);
    let service = service(&file);

    for age in [10, 100] {
        let input = TransactionInput {
            purchase_amount: 500.0,
            customer_age: age,
            footfall_count: 50,
            loyalty_tier: "Gold".into(),
            payment_method: "Credit Card".into(),
            product_category: "Skincare".into(),
            hour: 14.0,
            day_of_week: 2,
        };
        let verdict = service.assess(&input.to_record()).unwrap();
        assert!(matches!(verdict, Verdict::ManualReview { .. }));
    }

    let verdict = service.assess(&reference_record()).unwrap();
    assert!(matches!(verdict, Verdict::Clustered { .. }));
}

#[test]
fn test_unknown_category_still_scores() {
    let file = create_training_csv(40);
    let mut record = reference_record();
    record.set("Payment_Method", FieldValue::Text("Bitcoin".into()));

    let verdict = service(&file).assess(&record).unwrap();
    assert!(clustered(&verdict) < 4);
}

#[test]
fn test_missing_numeric_is_imputed() {
    let file = create_training_csv(40);
    let record = RawRecord::from_json(&serde_json::json!({
        "Purchase_Amount": 4600,
        "Customer_Age": 41,
        "Customer_Loyalty_Tier": "Platinum",
        "Payment_Method": "Crypto",
        "Product_Category": "Makeup",
        "Transaction_Time": "15:20:00",
        "Transaction_Date": "2025-01-09"
    }))
    .unwrap();

    let verdict = service(&file).assess(&record).unwrap();
    assert!(clustered(&verdict) < 4);
}

#[test]
fn test_malformed_timestamp_is_a_record_error() {
    let file = create_training_csv(40);
    let mut record = reference_record();
    record.set("Transaction_Time", FieldValue::Text("25:61".into()));

    let err = service(&file).assess(&record).unwrap_err();
    assert!(matches!(err, SentinelError::InvalidTime { .. }));
    assert!(err.is_record_level());
}

#[test]
fn test_batch_scoring_keeps_row_failures_local() {
    let training = create_training_csv(40);
    let service = service(&training);

    let mut upload = NamedTempFile::new().unwrap();
    writeln!(upload, "{}", HEADER).unwrap();
    writeln!(upload, "U1,C1,2025-02-03,14:00:00,30,Gold,Credit Card,Skincare,500.0,50,1.1.1.1,0").unwrap();
    writeln!(upload, "U2,C2,2025-02-04,bad-time,30,Gold,Credit Card,Skincare,500.0,50,1.1.1.2,0").unwrap();
    writeln!(upload, "U3,C3,2025-02-05,10:00:00,12,Gold,Credit Card,Skincare,500.0,50,1.1.1.3,0").unwrap();
    writeln!(upload, "U4,C4,2025-02-06,03:30:00,45,Bronze,Bitcoin,Sets,320.0,,1.1.1.4,1").unwrap();

    let mut df = read_csv(upload.path()).unwrap();
    let records = frame_to_records(&df).unwrap();
    let batch = service.score_records(&records).unwrap();

    assert_eq!(batch.outcomes.len(), 4);
    assert_eq!(batch.scored(), 3);
    assert_eq!(batch.failed(), 1);
    assert!(matches!(batch.outcomes[1], Err(SentinelError::InvalidTime { .. })));
    assert!(matches!(batch.outcomes[2], Ok(Verdict::ManualReview { .. })));
    assert_eq!(batch.clusters.len(), 2);
    assert_eq!(batch.features.nrows(), 2);

    batch.annotate(&mut df).unwrap();
    assert!(df.get_column_names().contains(&"Cluster"));
    assert!(df.get_column_names().contains(&"Risk_Label"));

    let out = tempdir().unwrap();
    let path = out.path().join("scored.csv");
    fraud_sentinel::data::write_csv(&mut df, &path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.lines().next().unwrap().ends_with("Cluster,Risk_Label,Risk_Level,Note"));
    assert_eq!(written.lines().count(), 5);
}

#[test]
fn test_batch_without_feature_columns_fails() {
    let training = create_training_csv(40);
    let service = service(&training);

    let records = vec![RawRecord::new().with("Shoe_Size", FieldValue::Number(42.0))];
    let result = service.score_records(&records);
    assert!(matches!(result, Err(SentinelError::SchemaMismatch { .. })));
}

#[test]
fn test_non_finite_amounts_are_rejected() {
    let file = create_training_csv(40);
    let service = service(&file);

    for text in ["inf", "-inf"] {
        let mut record = reference_record();
        record.set("Purchase_Amount", FieldValue::Text(text.into()));
        let err = service.assess(&record).unwrap_err();
        assert!(matches!(err, SentinelError::SchemaMismatch { .. }));
    }

    let mut record = reference_record();
    record.set("Purchase_Amount", FieldValue::Number(1e308));
    let err = service.assess(&record).unwrap_err();
    assert!(matches!(err, SentinelError::NonFiniteFeatures { .. }));
    assert!(err.is_record_level());
}

#[test]
fn test_batch_overflowing_row_fails_alone() {
    let training = create_training_csv(40);
    let service = service(&training);

    let mut huge = reference_record();
    huge.set("Purchase_Amount", FieldValue::Number(1e308));
    let records = vec![reference_record(), huge, reference_record()];

    let batch = service.score_records(&records).unwrap();
    assert_eq!(batch.scored(), 2);
    assert!(matches!(
        batch.outcomes[1],
        Err(SentinelError::NonFiniteFeatures { .. })
    ));
    assert_eq!(batch.clusters.len(), 2);
    assert_eq!(batch.features.nrows(), 2);
    assert_eq!(batch.clusters[0], batch.clusters[1]);
}
