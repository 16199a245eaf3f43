//! HTTP surface tests driven through the router without binding a socket

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use fraud_sentinel::features::{AlignedRow, FeatureSchema};
use fraud_sentinel::model::ClusteringParams;
use fraud_sentinel::{
    api, ArtifactMetadata, Pipeline, PipelineArtifact, PipelineParams, RiskTable, ScoringService,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn schema() -> FeatureSchema {
    FeatureSchema::new(
        vec![
            "Customer_Age".into(),
            "Purchase_Amount".into(),
            "Payment_Method".into(),
            "Time_Continuous".into(),
        ],
        vec![
            "Customer_Age".into(),
            "Purchase_Amount".into(),
            "Time_Continuous".into(),
        ],
    )
}

fn router() -> axum::Router {
    let rows: Vec<AlignedRow> = (0..24)
        .map(|i| {
            let high = i % 2 == 0;
            AlignedRow {
                numeric: vec![
                    25.0 + (i % 9) as f64,
                    if high { 5000.0 + i as f64 } else { 90.0 + i as f64 },
                    if high { 3.0 } else { 14.0 },
                ],
                categorical: vec![Some(if high { "Crypto" } else { "Credit Card" }.to_string())],
            }
        })
        .collect();

    let params = PipelineParams {
        clustering: ClusteringParams {
            n_clusters: 2,
            ..ClusteringParams::default()
        },
        n_neighbors: 3,
    };
    let (pipeline, report) = Pipeline::fit(schema(), &rows, params).unwrap();
    let artifact = PipelineArtifact::new(
        pipeline,
        ArtifactMetadata {
            trained_at: Utc::now(),
            training_rows: report.rows,
            source: "api-test".into(),
            params,
        },
    );
    api::app(Arc::new(ScoringService::new(artifact, RiskTable::default())))
}

async fn post_json(body: &str) -> (StatusCode, Value) {
    let response = router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let response = router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_predict_assigns_cluster() {
    let payload = json!({
        "Customer_Age": 30,
        "Purchase_Amount": 120.0,
        "Payment_Method": "Credit Card",
        "Transaction_Time": "14:05:00",
        "Transaction_ID": "T-1"
    });
    let (status, body) = post_json(&payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let cluster = body["cluster_assigned"].as_u64().unwrap();
    assert!(cluster < 2);
    assert!(body["message"].as_str().unwrap().contains(&format!("Cluster {}", cluster)));
}

#[tokio::test]
async fn test_predict_age_guard() {
    let payload = json!({"Customer_Age": 12, "Purchase_Amount": 120.0});
    let (status, body) = post_json(&payload.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "manual_review");
    assert!(body["cluster_assigned"].is_null());
}

#[tokio::test]
async fn test_predict_malformed_body_returns_error() {
    let (status, body) = post_json("{not json").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_predict_bad_time_returns_error() {
    let payload = json!({"Customer_Age": 30, "Transaction_Time": "half past two"});
    let (status, body) = post_json(&payload.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("half past two"));
}

#[tokio::test]
async fn test_predict_infinite_amount_returns_error() {
    let payload = json!({"Customer_Age": 30, "Purchase_Amount": "inf"});
    let (status, body) = post_json(&payload.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Purchase_Amount"));
}
