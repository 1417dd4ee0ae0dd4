//! Job (construction) features for profitability prediction.

use datasource::ConstructionRecord;
use serde::Serialize;
use tracing::info;

use crate::FeatureSet;

/// Financial summary for one construction job.
#[derive(Debug, Clone, Serialize)]
pub struct JobFeatures {
    pub construction_id: i64,
    pub contract_value: f64,
    pub live_profit: f64,
    /// Training target; stays absent when the source row has no value so
    /// the predictor can exclude the row instead of learning an imputed 0.
    pub profit_percentage: Option<f64>,
    pub total_po_value: f64,
    pub purchase_orders_count: i64,
    /// total_po_value / contract_value; 0 when the contract value is not
    /// positive.
    pub po_to_contract_ratio: f64,
    pub stage: String,
    pub status: String,
}

impl FeatureSet for JobFeatures {
    const FEATURE_TYPE: &'static str = "job_features";
    const ENTITY_TYPE: &'static str = "construction";

    fn entity_id(&self) -> i64 {
        self.construction_id
    }
}

/// Computes job features, one row per construction.
#[must_use]
pub fn compute_job_features(constructions: &[ConstructionRecord]) -> Vec<JobFeatures> {
    info!("Computing job features");

    let features: Vec<JobFeatures> = constructions
        .iter()
        .map(|job| {
            let contract_value = job.contract_value.unwrap_or(0.0);
            let total_po_value = job.total_po_value;

            let po_to_contract_ratio = if contract_value > 0.0 {
                total_po_value / contract_value
            } else {
                0.0
            };

            JobFeatures {
                construction_id: job.id,
                contract_value,
                live_profit: job.live_profit.unwrap_or(0.0),
                profit_percentage: job.profit_percentage,
                total_po_value,
                purchase_orders_count: job.purchase_orders_count,
                po_to_contract_ratio,
                stage: job.stage.clone().unwrap_or_default(),
                status: job.status.clone().unwrap_or_default(),
            }
        })
        .collect();

    info!(jobs = features.len(), "Computed job features");
    features
}
