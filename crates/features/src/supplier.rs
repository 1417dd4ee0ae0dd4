//! Supplier performance features.

use datasource::SupplierRecord;
use serde::Serialize;
use tracing::info;

use crate::FeatureSet;

/// Performance summary for one supplier.
///
/// A direct projection of the extractor's per-supplier aggregates; missing
/// source values are imputed to zero so the key set stays fixed.
#[derive(Debug, Clone, Serialize)]
pub struct SupplierFeatures {
    pub supplier_id: i64,
    pub total_po_value: f64,
    pub avg_po_value: f64,
    pub total_purchase_orders: i64,
    pub response_rate: f64,
    pub rating: i64,
    pub is_active: bool,
}

impl FeatureSet for SupplierFeatures {
    const FEATURE_TYPE: &'static str = "supplier_features";
    const ENTITY_TYPE: &'static str = "supplier";

    fn entity_id(&self) -> i64 {
        self.supplier_id
    }
}

/// Computes supplier features, one row per supplier.
#[must_use]
pub fn compute_supplier_features(suppliers: &[SupplierRecord]) -> Vec<SupplierFeatures> {
    info!("Computing supplier features");

    let features: Vec<SupplierFeatures> = suppliers
        .iter()
        .map(|s| SupplierFeatures {
            supplier_id: s.id,
            total_po_value: s.total_po_value,
            avg_po_value: s.avg_po_value,
            total_purchase_orders: s.total_purchase_orders,
            response_rate: s.response_rate.unwrap_or(0.0),
            rating: i64::from(s.rating.unwrap_or(0)),
            is_active: s.is_active.unwrap_or(true),
        })
        .collect();

    info!(suppliers = features.len(), "Computed supplier features");
    features
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_projection_with_missing_values() {
        let suppliers = vec![SupplierRecord {
            id: 11,
            name: Some("Acme Timber".to_string()),
            rating: None,
            response_rate: None,
            avg_response_time: None,
            is_active: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            total_purchase_orders: 4,
            total_po_value: 1200.0,
            avg_po_value: 300.0,
        }];

        let features = compute_supplier_features(&suppliers);
        assert_eq!(features.len(), 1);

        let f = &features[0];
        assert_eq!(f.supplier_id, 11);
        assert_eq!(f.rating, 0);
        assert_eq!(f.response_rate, 0.0);
        assert!(f.is_active);
        assert_eq!(f.total_purchase_orders, 4);
    }
}
