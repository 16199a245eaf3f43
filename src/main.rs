//! Fraud Sentinel entrypoint: training, single-record scoring, batch scoring
//! and the HTTP API

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fraud_sentinel::{
    api,
    cli::{Args, BatchArgs, Command, PredictArgs, ServeArgs, TrainArgs},
    config::AppConfig,
    data, telemetry, viz, ArtifactMetadata, Pipeline, PipelineArtifact, ScoringService,
    TrainingReport, Verdict,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from_path(path, true)?,
        None => AppConfig::load()?,
    };
    telemetry::init_logging(&config.logging, args.verbose)?;

    let artifact_path = args
        .model
        .clone()
        .unwrap_or_else(|| config.model.artifact_path.clone());

    match &args.command {
        Command::Train(train) => run_train(&config, train, &artifact_path),
        Command::Predict(predict) => run_predict(&config, predict, &artifact_path),
        Command::Batch(batch) => run_batch(&config, batch, &artifact_path),
        Command::Serve(serve) => run_serve(&config, serve, &artifact_path),
    }
}

/// Load the artifact or refuse to continue
fn load_service(config: &AppConfig, artifact_path: &Path) -> Result<ScoringService> {
    ScoringService::load(artifact_path, config.risk.clone()).with_context(|| {
        format!(
            "Cannot start without a trained pipeline; run `fraud-sentinel train` to create {}",
            artifact_path.display()
        )
    })
}

fn run_train(config: &AppConfig, args: &TrainArgs, artifact_path: &Path) -> Result<()> {
    println!("=== Training Pipeline ===\n");
    let start_time = Instant::now();

    let mut params = config.model.pipeline_params();
    if let Some(k) = args.clusters {
        params.clustering.n_clusters = k;
    }
    if let Some(seed) = args.seed {
        params.clustering.seed = seed;
    }
    if let Some(max_iters) = args.max_iters {
        params.clustering.max_iters = max_iters;
    }
    if let Some(tolerance) = args.tolerance {
        params.clustering.tolerance = tolerance;
    }
    if let Some(neighbors) = args.neighbors {
        params.n_neighbors = neighbors;
    }

    let training = data::load_training_data(&args.input)
        .with_context(|| format!("Failed to prepare training data from {}", args.input.display()))?;
    println!("✓ Data loaded: {} transactions", training.rows.len());
    println!("  Numeric features: {:?}", training.schema.numeric_features);
    println!("  Categorical features: {:?}", training.schema.categorical_features);

    let (pipeline, report) = Pipeline::fit(training.schema, &training.rows, params)?;
    println!("✓ Pipeline fitted with {} clusters", pipeline.n_clusters());

    print_cluster_statistics(&pipeline, &report);

    if let Some(plot) = &args.plot {
        let projection = viz::project(&report.features, &pipeline.model().centroids)?;
        viz::create_cluster_visualization(
            &projection,
            &report.labels.to_vec(),
            plot,
            Some("Training Clusters: PCA Projection"),
        )?;
        println!("\nProjection plot saved to: {}", plot);
    }

    let artifact = PipelineArtifact::new(
        pipeline,
        ArtifactMetadata {
            trained_at: Utc::now(),
            training_rows: report.rows,
            source: args.input.display().to_string(),
            params,
        },
    );
    artifact.save(artifact_path)?;

    println!("\n=== Training Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Artifact saved to: {}", artifact_path.display());
    println!("Review the cluster statistics above and update the [risk] table if ids moved.");

    Ok(())
}

/// Print cluster statistics to console
fn print_cluster_statistics(pipeline: &Pipeline, report: &TrainingReport) {
    println!("\n=== Cluster Statistics ===");
    println!("Total transactions: {}", report.rows);
    println!("Within-cluster sum of squares (Inertia): {:.2}", report.inertia);
    println!("Silhouette score (sample): {:.3}", report.silhouette);

    for summary in &report.clusters {
        println!(
            "\nCluster {}: {} transactions ({:.1}%)",
            summary.cluster,
            summary.size,
            summary.share * 100.0
        );
        for (feature, mean) in &summary.numeric_means {
            println!("  {:<24} mean {:>10.2}", feature, mean);
        }
        for (feature, value) in &summary.dominant_categories {
            println!("  {:<24} mostly {}", feature, value.as_deref().unwrap_or("-"));
        }
    }

    println!("\nPreprocessed feature columns: {}", pipeline.preprocessor().output_width());
}

fn print_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::Clustered { cluster, profile } => {
            println!(
                "Result: {} (Cluster {}) [{}]",
                profile.label, cluster, profile.color
            );
            println!("Calculated Risk Level: {}", profile.risk_level);
            println!("{}", profile.action);
        }
        Verdict::ManualReview { reason } => {
            println!("🚨 {}", reason);
        }
    }
}

fn run_predict(config: &AppConfig, args: &PredictArgs, artifact_path: &Path) -> Result<()> {
    let service = load_service(config, artifact_path)?;
    let record = args.to_input().to_record();

    match service.assess(&record) {
        Ok(verdict) => print_verdict(&verdict),
        Err(e) => println!("Prediction failed: {}", e),
    }
    Ok(())
}

fn run_batch(config: &AppConfig, args: &BatchArgs, artifact_path: &Path) -> Result<()> {
    let service = load_service(config, artifact_path)?;
    let start_time = Instant::now();

    let mut df = data::read_csv(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let records = data::frame_to_records(&df)?;
    let batch = service.score_records(&records)?;
    batch.annotate(&mut df)?;
    data::write_csv(&mut df, &args.output)?;

    info!(
        scored = batch.scored(),
        failed = batch.failed(),
        "Batch scored"
    );
    println!("✓ Scored {} of {} rows", batch.scored(), batch.outcomes.len());
    if batch.failed() > 0 {
        println!("  {} rows could not be scored, see the Note column", batch.failed());
    }
    println!(
        "  Predictions (Cluster 0-{}) written to: {}",
        service.artifact().pipeline.n_clusters().saturating_sub(1),
        args.output.display()
    );

    if let Some(plot) = &args.plot {
        let centroids = &service.artifact().pipeline.model().centroids;
        let projection = viz::project(&batch.features, centroids)?;
        viz::create_cluster_visualization(&projection, &batch.clusters, plot, None)?;
        println!("  Projection plot saved to: {}", plot);
    }

    println!("Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn run_serve(config: &AppConfig, args: &ServeArgs, artifact_path: &Path) -> Result<()> {
    // Load before binding so a missing artifact never serves traffic
    let service = Arc::new(load_service(config, artifact_path)?);
    let bind_addr = args
        .bind
        .clone()
        .unwrap_or_else(|| config.server.bind_addr.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        info!("fraud-sentinel listening on {}", bind_addr);
        axum::serve(listener, api::app(service))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok::<(), anyhow::Error>(())
    })
}
