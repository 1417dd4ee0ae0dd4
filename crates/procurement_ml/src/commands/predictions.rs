//! Predictions command - lists recent predictions from one model.

use anyhow::Result;
use config::Config;
use datasource::create_pool;
use feature_store::FeatureStore;
use tracing::info;

/// Runs the predictions command.
///
/// # Errors
///
/// Returns an error if the database connection or query fails.
pub async fn run(
    config: &Config,
    model: &str,
    entity_type: Option<&str>,
    days_back: i32,
) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    let store = FeatureStore::new(&pool);

    let predictions = store.get_predictions(model, entity_type, days_back).await?;
    info!(count = predictions.len(), model, "Loaded predictions");

    for p in &predictions {
        println!(
            "{} {} {}#{} confidence={} {}",
            p.predicted_at.format("%Y-%m-%d %H:%M"),
            p.model_version,
            p.entity_type,
            p.entity_id,
            p.confidence_score
                .map_or_else(|| "-".to_string(), |c| format!("{c:.3}")),
            serde_json::to_string(&p.prediction_value)?
        );
    }

    Ok(())
}
