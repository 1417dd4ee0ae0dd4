//! Procurement ML pipeline
//!
//! Batch training and inference for procurement analytics: price anomaly
//! detection, supplier price-trend risk scoring, and job profitability
//! prediction.

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod pipeline;

/// Procurement ML pipeline
#[derive(Parser)]
#[command(name = "procurement-ml")]
#[command(about = "Batch ML training and inference for procurement analytics")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the feature store tables
    Setup,

    /// Run the full training pipeline: extract, compute features, train
    /// all models, persist predictions, and write the training report
    Train,

    /// Check a single proposed price against an item's purchase history
    CheckPrice {
        /// Pricebook item code
        #[arg(long, conflicts_with = "item_id", required_unless_present = "item_id")]
        item_code: Option<String>,

        /// Pricebook item id
        #[arg(long)]
        item_id: Option<i64>,

        /// Proposed unit price to check
        #[arg(long)]
        price: f64,
    },

    /// Show recent predictions from a model
    Predictions {
        /// Model name (price_anomaly, supplier_trend, profit_predictor)
        #[arg(short, long)]
        model: String,

        /// Filter by entity type
        #[arg(short, long)]
        entity_type: Option<String>,

        /// How many days of predictions to show
        #[arg(short, long, default_value = "7")]
        days_back: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Setup => {
            commands::setup::run(&config).await?;
        }
        Commands::Train => {
            commands::train::run(&config).await?;
        }
        Commands::CheckPrice {
            item_code,
            item_id,
            price,
        } => {
            commands::check_price::run(&config, item_code, item_id, price).await?;
        }
        Commands::Predictions {
            model,
            entity_type,
            days_back,
        } => {
            commands::predictions::run(&config, &model, entity_type.as_deref(), days_back)
                .await?;
        }
    }

    Ok(())
}
