//! On-disk model artifact bundles.
//!
//! One tagged JSON object per model family holding exactly the fitted
//! parameters, the scaler, the ordered feature name list, and the version
//! tag. The filename encodes family, version, and save date so a retried
//! run never clobbers the previous run's bundle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::isolation_forest::IsolationForest;
use crate::scaler::StandardScaler;
use crate::supplier_trend::SupplierTrend;
use crate::ModelError;

/// A serialized model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelArtifact {
    PriceAnomaly {
        forest: IsolationForest,
        scaler: StandardScaler,
        feature_names: Vec<String>,
        model_version: String,
        saved_at: DateTime<Utc>,
    },
    SupplierTrend {
        supplier_trends: BTreeMap<i64, SupplierTrend>,
        model_version: String,
        saved_at: DateTime<Utc>,
    },
    ProfitPredictor {
        weights: Vec<f64>,
        bias: f64,
        scaler: StandardScaler,
        feature_names: Vec<String>,
        model_version: String,
        saved_at: DateTime<Utc>,
    },
}

impl ModelArtifact {
    /// The model family encoded into the filename.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::PriceAnomaly { .. } => "price_anomaly",
            Self::SupplierTrend { .. } => "supplier_trend",
            Self::ProfitPredictor { .. } => "profit_predictor",
        }
    }

    fn model_version(&self) -> &str {
        match self {
            Self::PriceAnomaly { model_version, .. }
            | Self::SupplierTrend { model_version, .. }
            | Self::ProfitPredictor { model_version, .. } => model_version,
        }
    }

    /// `{family}_{version}_{YYYYMMDD}.json`
    #[must_use]
    pub fn filename(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}.json",
            self.family(),
            self.model_version(),
            now.format("%Y%m%d")
        )
    }

    /// Writes the bundle as one atomic object and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the object write fails.
    pub async fn save(
        &self,
        store: &dyn ObjectStore,
        now: DateTime<Utc>,
    ) -> Result<ObjectPath, ModelError> {
        let path = ObjectPath::from(self.filename(now));
        let bytes = serde_json::to_vec_pretty(self)?;

        store.put(&path, bytes.into()).await?;

        info!(family = self.family(), path = %path, "Model artifact saved");
        Ok(path)
    }

    /// Reads a bundle back from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or fails to deserialize.
    pub async fn load(store: &dyn ObjectStore, path: &ObjectPath) -> Result<Self, ModelError> {
        let bytes = store.get(path).await?.bytes().await?;
        let artifact: Self = serde_json::from_slice(&bytes)?;

        info!(family = artifact.family(), path = %path, "Model artifact loaded");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use object_store::memory::InMemory;

    use super::*;

    #[test]
    fn test_filename_encodes_family_version_date() {
        let artifact = ModelArtifact::SupplierTrend {
            supplier_trends: BTreeMap::new(),
            model_version: "v1".to_string(),
            saved_at: Utc::now(),
        };

        let now = Utc.with_ymd_and_hms(2026, 8, 23, 10, 0, 0).unwrap();
        assert_eq!(artifact.filename(now), "supplier_trend_v1_20260823.json");
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let store = InMemory::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 10, 0, 0).unwrap();

        let artifact = ModelArtifact::ProfitPredictor {
            weights: vec![0.5, -0.25, 0.1, 0.0],
            bias: 1.5,
            scaler: StandardScaler {
                means: vec![0.0; 4],
                stds: vec![1.0; 4],
            },
            feature_names: vec!["contract_value".to_string()],
            model_version: "v1".to_string(),
            saved_at: now,
        };

        let path = artifact.save(&store, now).await.unwrap();
        let loaded = ModelArtifact::load(&store, &path).await.unwrap();

        match loaded {
            ModelArtifact::ProfitPredictor { weights, bias, .. } => {
                assert_eq!(weights, vec![0.5, -0.25, 0.1, 0.0]);
                assert!((bias - 1.5).abs() < 1e-12);
            }
            other => panic!("unexpected artifact family: {}", other.family()),
        }
    }
}
