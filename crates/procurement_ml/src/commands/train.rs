//! Train command - runs the full training pipeline and prints a summary.

use anyhow::Result;
use config::Config;

use crate::pipeline::{self, ModelOutcome};

/// Runs the train command.
///
/// # Errors
///
/// Returns an error if extraction or persistence fails. Individual model
/// failures are reported in the summary, not as a command failure.
pub async fn run(config: &Config) -> Result<()> {
    let report = pipeline::run(config).await?;

    println!("\nTraining summary:");
    for (name, outcome) in &report.models {
        match outcome {
            ModelOutcome::Success { metrics } => {
                println!("  {name}: success");
                println!("{}", serde_json::to_string_pretty(metrics)?);
            }
            ModelOutcome::Skipped { reason } => {
                println!("  {name}: skipped ({reason})");
            }
            ModelOutcome::Failed { error } => {
                println!("  {name}: failed ({error})");
            }
        }
    }

    Ok(())
}
