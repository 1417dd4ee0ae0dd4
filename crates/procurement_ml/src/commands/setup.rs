//! Setup command - creates the feature store schema.

use anyhow::Result;
use config::Config;
use datasource::create_pool;
use feature_store::FeatureStore;
use tracing::info;

/// Runs the setup command.
///
/// # Errors
///
/// Returns an error if the database connection or schema creation fails.
pub async fn run(config: &Config) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    let store = FeatureStore::new(&pool);
    store.create_tables().await?;

    info!("Feature store ready");
    Ok(())
}
