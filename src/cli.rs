//! Command-line interface definitions and argument parsing

use crate::features::TransactionInput;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Transaction risk clustering: train the pipeline offline, then score
/// single records, CSV uploads or JSON requests against it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the pipeline artifact (overrides configuration)
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fit the preprocessing + clustering pipeline on a raw transaction CSV
    Train(TrainArgs),
    /// Score one transaction entered field by field
    Predict(PredictArgs),
    /// Score every row of a CSV file and write an augmented copy
    Batch(BatchArgs),
    /// Serve the JSON prediction API
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TrainArgs {
    /// Path to the raw transaction CSV
    #[arg(short, long, default_value = "dataset/luxury_cosmetics_fraud_analysis_2025.csv")]
    pub input: PathBuf,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Seed for centroid initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Tolerance for K-Means convergence
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Neighbors for numeric KNN imputation
    #[arg(long)]
    pub neighbors: Option<usize>,

    /// Output path for a PCA projection plot of the training clusters
    #[arg(long)]
    pub plot: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct PredictArgs {
    /// Purchase amount in USD
    #[arg(long, default_value = "100.0")]
    pub amount: f64,

    /// Customer age
    #[arg(long, default_value = "25")]
    pub age: i64,

    /// Store footfall count
    #[arg(long, default_value = "50")]
    pub footfall: i64,

    /// Loyalty tier (Gold, Silver, Bronze, None)
    #[arg(long, default_value = "Gold")]
    pub loyalty: String,

    /// Payment method (Credit Card, PayPal, Cash, Crypto)
    #[arg(long, default_value = "Credit Card")]
    pub payment: String,

    /// Product category (Skincare, Fragrance, Makeup)
    #[arg(long, default_value = "Skincare")]
    pub category: String,

    /// Transaction hour, 0-23
    #[arg(long, default_value = "14", value_parser = clap::value_parser!(u8).range(0..24))]
    pub hour: u8,

    /// Day of week, 0 = Monday .. 6 = Sunday
    #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..7))]
    pub day: u32,
}

impl PredictArgs {
    pub fn to_input(&self) -> TransactionInput {
        TransactionInput {
            purchase_amount: self.amount,
            customer_age: self.age,
            footfall_count: self.footfall,
            loyalty_tier: self.loyalty.clone(),
            payment_method: self.payment.clone(),
            product_category: self.category.clone(),
            hour: self.hour as f64,
            day_of_week: self.day,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct BatchArgs {
    /// CSV file to score
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination of the augmented CSV
    #[arg(short, long, default_value = "scored_transactions.csv")]
    pub output: PathBuf,

    /// Output path for a PCA projection plot of the scored rows
    #[arg(long)]
    pub plot: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ServeArgs {
    /// Address to bind, e.g. 0.0.0.0:5000 (overrides configuration)
    #[arg(short, long)]
    pub bind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let args = Args::parse_from([
            "fraud-sentinel",
            "predict",
            "--amount",
            "500",
            "--age",
            "30",
            "--payment",
            "PayPal",
            "--hour",
            "23",
            "--day",
            "6",
        ]);
        let Command::Predict(predict) = args.command else {
            panic!("expected predict subcommand");
        };
        let input = predict.to_input();
        assert_eq!(input.purchase_amount, 500.0);
        assert_eq!(input.customer_age, 30);
        assert_eq!(input.payment_method, "PayPal");
        assert_eq!(input.loyalty_tier, "Gold");
        assert_eq!(input.hour, 23.0);
        assert_eq!(input.day_of_week, 6);
    }

    #[test]
    fn test_rejects_out_of_range_hour_and_day() {
        assert!(Args::try_parse_from(["fraud-sentinel", "predict", "--hour", "24"]).is_err());
        assert!(Args::try_parse_from(["fraud-sentinel", "predict", "--day", "7"]).is_err());
    }

    #[test]
    fn test_global_model_flag() {
        let args = Args::parse_from([
            "fraud-sentinel",
            "batch",
            "--input",
            "upload.csv",
            "--model",
            "models/m.bin",
        ]);
        assert_eq!(args.model, Some(PathBuf::from("models/m.bin")));
        assert!(matches!(args.command, Command::Batch(_)));
    }
}
