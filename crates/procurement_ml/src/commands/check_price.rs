//! Check-price command - single-point anomaly check for a proposed price.

use anyhow::Result;
use config::Config;
use datasource::{create_pool, DataExtractor, ItemPurchase, ItemSelector};
use models::check_single_price;
use tracing::info;

/// Runs the check-price command.
///
/// # Errors
///
/// Returns an error if no item selector was given or the history query
/// fails. An item with no purchase history is not an error; the check
/// reports it explicitly.
pub async fn run(
    config: &Config,
    item_code: Option<String>,
    item_id: Option<i64>,
    price: f64,
) -> Result<()> {
    let selector = match (item_code, item_id) {
        (Some(code), None) => ItemSelector::Code(code),
        (None, Some(id)) => ItemSelector::Id(id),
        _ => anyhow::bail!("exactly one of --item-code or --item-id must be given"),
    };

    let pool = create_pool(&config.database_url).await?;
    let extractor = DataExtractor::new(&pool);

    let history = extractor.item_purchase_history(&selector).await?;
    info!(purchases = history.len(), "Loaded item purchase history");

    let prices = historical_prices(&history);

    let check = check_single_price(&prices, price);
    println!("{}", serde_json::to_string_pretty(&check)?);

    Ok(())
}

/// Unit prices from the purchase history. Only rows with no recorded
/// price are dropped; a genuine zero price still counts toward the
/// statistics.
fn historical_prices(history: &[ItemPurchase]) -> Vec<f64> {
    history.iter().filter_map(|p| p.unit_price).collect()
}
