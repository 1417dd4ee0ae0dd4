//! Price features per pricebook item.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use datasource::PoLineItem;
use serde::Serialize;
use tracing::info;

use crate::FeatureSet;

/// Price statistics for one pricebook item over the extraction window.
#[derive(Debug, Clone, Serialize)]
pub struct PriceFeatures {
    pub pricebook_item_id: i64,
    pub mean_price: f64,
    /// Sample standard deviation; 0 when fewer than two observations.
    pub std_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_range: f64,
    /// std / mean; 0 when the mean is not positive.
    pub coefficient_variation: f64,
    pub purchase_count: i64,
    pub total_quantity: f64,
    pub days_since_first_purchase: i64,
    pub days_since_last_purchase: i64,
}

impl FeatureSet for PriceFeatures {
    const FEATURE_TYPE: &'static str = "price_features";
    const ENTITY_TYPE: &'static str = "pricebook_item";

    fn entity_id(&self) -> i64 {
        self.pricebook_item_id
    }
}

/// Computes price features from purchase-order line items, one row per
/// pricebook item.
///
/// Rows without a pricebook item id are skipped. Items with zero valid
/// price observations are dropped rather than zero-filled. Output is
/// ordered by item id.
#[must_use]
pub fn compute_price_features(items: &[PoLineItem], now: DateTime<Utc>) -> Vec<PriceFeatures> {
    info!("Computing price features");

    let mut groups: BTreeMap<i64, Vec<&PoLineItem>> = BTreeMap::new();
    for item in items {
        let Some(id) = item.pricebook_item_id else {
            continue;
        };
        groups.entry(id).or_default().push(item);
    }

    let mut features = Vec::with_capacity(groups.len());

    for (item_id, group) in groups {
        let prices: Vec<f64> = group.iter().filter_map(|row| row.unit_price).collect();

        if prices.is_empty() {
            continue;
        }

        let count = prices.len() as f64;
        let mean = prices.iter().sum::<f64>() / count;
        let std = if prices.len() > 1 {
            let var = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (count - 1.0);
            var.sqrt()
        } else {
            0.0
        };
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let coefficient_variation = if mean > 0.0 { std / mean } else { 0.0 };

        let first = group
            .iter()
            .map(|row| row.created_at)
            .min()
            .unwrap_or(now);
        let last = group
            .iter()
            .map(|row| row.created_at)
            .max()
            .unwrap_or(now);

        features.push(PriceFeatures {
            pricebook_item_id: item_id,
            mean_price: mean,
            std_price: std,
            min_price: min,
            max_price: max,
            price_range: max - min,
            coefficient_variation,
            purchase_count: group.len() as i64,
            total_quantity: group.iter().filter_map(|row| row.quantity).sum(),
            days_since_first_purchase: (now - first).num_days(),
            days_since_last_purchase: (now - last).num_days(),
        });
    }

    info!(items = features.len(), "Computed price features");
    features
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn line_item(
        id: i64,
        pricebook_item_id: Option<i64>,
        unit_price: Option<f64>,
        quantity: f64,
        created_at: DateTime<Utc>,
    ) -> PoLineItem {
        PoLineItem {
            id,
            purchase_order_id: 1,
            pricebook_item_id,
            description: None,
            quantity: Some(quantity),
            unit_price,
            total_amount: None,
            created_at,
            supplier_id: Some(1),
            construction_id: None,
            supplier_name: None,
            item_code: None,
            item_name: None,
            category: None,
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_basic_aggregation() {
        let rows = vec![
            line_item(1, Some(7), Some(100.0), 2.0, at(1)),
            line_item(2, Some(7), Some(110.0), 1.0, at(5)),
            line_item(3, Some(7), Some(90.0), 3.0, at(10)),
        ];

        let features = compute_price_features(&rows, at(20));
        assert_eq!(features.len(), 1);

        let f = &features[0];
        assert_eq!(f.pricebook_item_id, 7);
        assert!((f.mean_price - 100.0).abs() < 1e-9);
        assert!((f.min_price - 90.0).abs() < 1e-9);
        assert!((f.max_price - 110.0).abs() < 1e-9);
        assert!((f.price_range - 20.0).abs() < 1e-9);
        assert_eq!(f.purchase_count, 3);
        assert!((f.total_quantity - 6.0).abs() < 1e-9);
        assert_eq!(f.days_since_first_purchase, 19);
        assert_eq!(f.days_since_last_purchase, 10);
    }

    #[test]
    fn test_std_zero_for_single_observation() {
        let rows = vec![line_item(1, Some(3), Some(42.0), 1.0, at(1))];
        let features = compute_price_features(&rows, at(2));

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].std_price, 0.0);
        assert_eq!(features[0].coefficient_variation, 0.0);
    }

    #[test]
    fn test_coefficient_variation_finite_and_nonnegative() {
        let rows = vec![
            line_item(1, Some(1), Some(50.0), 1.0, at(1)),
            line_item(2, Some(1), Some(150.0), 1.0, at(2)),
            line_item(3, Some(2), Some(0.0), 1.0, at(1)),
            line_item(4, Some(2), Some(0.0), 1.0, at(2)),
        ];

        let features = compute_price_features(&rows, at(3));
        for f in &features {
            assert!(f.coefficient_variation.is_finite());
            if f.mean_price > 0.0 {
                assert!(f.coefficient_variation >= 0.0);
            } else {
                assert_eq!(f.coefficient_variation, 0.0);
            }
        }
    }

    #[test]
    fn test_null_grouping_keys_skipped() {
        let rows = vec![
            line_item(1, None, Some(10.0), 1.0, at(1)),
            line_item(2, Some(5), Some(10.0), 1.0, at(1)),
        ];

        let features = compute_price_features(&rows, at(2));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].pricebook_item_id, 5);
    }

    #[test]
    fn test_items_without_prices_dropped() {
        let rows = vec![
            line_item(1, Some(9), None, 1.0, at(1)),
            line_item(2, Some(9), None, 2.0, at(2)),
        ];

        let features = compute_price_features(&rows, at(3));
        assert!(features.is_empty());
    }
}
