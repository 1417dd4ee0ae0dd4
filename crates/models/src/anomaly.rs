//! Price anomaly detection for pricebook items.
//!
//! Two complementary paths: a population model (isolation forest over the
//! price-feature table) and a single-point z-score check that needs no
//! fitted model at all.

use chrono::{DateTime, Utc};
use features::PriceFeatures;
use ndarray::Array2;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::Serialize;
use tracing::info;

use crate::isolation_forest::{ForestParams, IsolationForest};
use crate::scaler::StandardScaler;
use crate::{ModelArtifact, ModelError};

/// Ordered feature list the population model trains on. Any vector
/// presented for scoring is projected onto exactly this list.
pub const ANOMALY_FEATURE_NAMES: [&str; 6] = [
    "mean_price",
    "std_price",
    "price_range",
    "coefficient_variation",
    "purchase_count",
    "days_since_last_purchase",
];

/// Metrics reported after training the population model.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyTrainingMetrics {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub num_samples: usize,
    pub num_features: usize,
    pub num_anomalies_detected: usize,
    pub anomaly_rate: f64,
    pub mean_anomaly_score: f64,
    pub std_anomaly_score: f64,
}

/// One scored item from the population model.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyPrediction {
    pub pricebook_item_id: i64,
    pub is_anomaly: bool,
    /// Raw forest score; more negative = more anomalous.
    pub anomaly_score: f64,
    /// Batch-relative confidence in [0, 1], min-max-normalized over the
    /// scored batch and inverted so it rises with anomalousness. Not an
    /// absolute calibrated probability.
    pub confidence: f64,
}

/// Result of the single-point z-score check.
#[derive(Debug, Clone, Serialize)]
pub struct SinglePriceCheck {
    pub is_anomaly: bool,
    pub z_score: f64,
    pub confidence: f64,
    pub mean_price: Option<f64>,
    pub std_price: Option<f64>,
    pub num_historical_prices: usize,
    pub price_deviation: Option<f64>,
    pub price_deviation_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct TrainedState {
    forest: IsolationForest,
    scaler: StandardScaler,
}

/// Isolation-forest model over item price features.
///
/// Holds no state between calls beyond the fitted forest and scaler;
/// retraining fully replaces prior state.
pub struct PriceAnomalyDetector {
    model_version: String,
    params: ForestParams,
    state: Option<TrainedState>,
}

impl PriceAnomalyDetector {
    #[must_use]
    pub const fn new(model_version: String, params: ForestParams) -> Self {
        Self {
            model_version,
            params,
            state: None,
        }
    }

    /// Projects feature records onto [`ANOMALY_FEATURE_NAMES`] order,
    /// dropping all-zero rows (no variance to isolate).
    fn prepare(features: &[PriceFeatures]) -> (Vec<i64>, Array2<f64>) {
        let rows: Vec<(i64, [f64; 6])> = features
            .iter()
            .map(|f| {
                (
                    f.pricebook_item_id,
                    [
                        f.mean_price,
                        f.std_price,
                        f.price_range,
                        f.coefficient_variation,
                        f.purchase_count as f64,
                        f.days_since_last_purchase as f64,
                    ],
                )
            })
            .filter(|(_, row)| row.iter().any(|v| *v != 0.0))
            .collect();

        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let matrix = Array2::from_shape_fn((rows.len(), 6), |(i, j)| rows[i].1[j]);
        (ids, matrix)
    }

    /// Trains the population model on the full price-feature table.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InsufficientData`] when fewer than
    /// `min_samples` feature rows are available.
    pub fn train(
        &mut self,
        features: &[PriceFeatures],
        min_samples: usize,
    ) -> Result<AnomalyTrainingMetrics, ModelError> {
        info!("Starting price anomaly model training");

        if features.len() < min_samples {
            return Err(ModelError::InsufficientData {
                needed: min_samples,
                got: features.len(),
            });
        }

        let (_, matrix) = Self::prepare(features);
        if matrix.nrows() < 2 {
            return Err(ModelError::InsufficientData {
                needed: min_samples,
                got: matrix.nrows(),
            });
        }

        let (scaler, scaled) = StandardScaler::fit_transform(&matrix);
        let forest = IsolationForest::fit(&scaled, &self.params);

        let flags = forest.predict(&scaled);
        let scores = forest.score_samples(&scaled);

        let num_anomalies = flags.iter().filter(|f| **f).count();
        let n = scores.len() as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let std_score =
            (scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n).sqrt();

        let metrics = AnomalyTrainingMetrics {
            model_version: self.model_version.clone(),
            trained_at: Utc::now(),
            num_samples: matrix.nrows(),
            num_features: ANOMALY_FEATURE_NAMES.len(),
            num_anomalies_detected: num_anomalies,
            anomaly_rate: num_anomalies as f64 / n,
            mean_anomaly_score: mean_score,
            std_anomaly_score: std_score,
        };

        self.state = Some(TrainedState { forest, scaler });

        info!(
            num_samples = metrics.num_samples,
            num_anomalies, "Price anomaly training complete"
        );
        Ok(metrics)
    }

    /// Scores a batch of price-feature rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] before `train` or `load`.
    pub fn predict(
        &self,
        features: &[PriceFeatures],
    ) -> Result<Vec<AnomalyPrediction>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained)?;

        let (ids, matrix) = Self::prepare(features);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let scaled = state.scaler.transform(&matrix);
        let scores = state.forest.score_samples(&scaled);
        let flags = state.forest.predict(&scaled);

        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = max - min;

        let predictions = ids
            .into_iter()
            .zip(scores)
            .zip(flags)
            .map(|((id, score), is_anomaly)| AnomalyPrediction {
                pricebook_item_id: id,
                is_anomaly,
                anomaly_score: score,
                confidence: if spread > f64::EPSILON {
                    1.0 - (score - min) / spread
                } else {
                    0.0
                },
            })
            .collect();

        Ok(predictions)
    }

    /// Bundles the fitted state into an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] when there is nothing to save.
    pub fn to_artifact(&self, saved_at: DateTime<Utc>) -> Result<ModelArtifact, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained)?;

        Ok(ModelArtifact::PriceAnomaly {
            forest: state.forest.clone(),
            scaler: state.scaler.clone(),
            feature_names: ANOMALY_FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            model_version: self.model_version.clone(),
            saved_at,
        })
    }

    /// Restores a detector from a saved artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WrongArtifact`] for any other family.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        match artifact {
            ModelArtifact::PriceAnomaly {
                forest,
                scaler,
                model_version,
                ..
            } => Ok(Self {
                model_version,
                params: ForestParams::default(),
                state: Some(TrainedState { forest, scaler }),
            }),
            other => Err(ModelError::WrongArtifact {
                expected: "price_anomaly",
                found: other.family(),
            }),
        }
    }

    /// Saves the fitted bundle to the artifact store.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is untrained or the write fails.
    pub async fn save(
        &self,
        store: &dyn ObjectStore,
        now: DateTime<Utc>,
    ) -> Result<ObjectPath, ModelError> {
        self.to_artifact(now)?.save(store, now).await
    }

    /// Loads a detector from a saved bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing, malformed, or from a
    /// different model family.
    pub async fn load(store: &dyn ObjectStore, path: &ObjectPath) -> Result<Self, ModelError> {
        Self::from_artifact(ModelArtifact::load(store, path).await?)
    }
}

/// Checks one candidate price against an item's full price history using
/// the three-sigma rule. Needs no fitted model.
///
/// With zero price variance, any differing price is flagged with
/// confidence 1. With no history at all, the check reports "no historical
/// data" and treats the price as non-anomalous rather than blocking.
#[must_use]
pub fn check_single_price(prices: &[f64], candidate: f64) -> SinglePriceCheck {
    if prices.is_empty() {
        return SinglePriceCheck {
            is_anomaly: false,
            z_score: 0.0,
            confidence: 0.0,
            mean_price: None,
            std_price: None,
            num_historical_prices: 0,
            price_deviation: None,
            price_deviation_pct: None,
            message: Some("No historical data available".to_string()),
        };
    }

    let n = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / n;
    let std = if prices.len() > 1 {
        (prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    let deviation = candidate - mean;
    let deviation_pct = if mean > 0.0 {
        Some(deviation / mean * 100.0)
    } else {
        Some(0.0)
    };

    let (is_anomaly, z_score, confidence) = if std > 0.0 {
        let z = (deviation / std).abs();
        (z > 3.0, z, (z / 3.0).min(1.0))
    } else {
        let differs = deviation.abs() > 1e-12;
        (differs, 0.0, if differs { 1.0 } else { 0.0 })
    };

    SinglePriceCheck {
        is_anomaly,
        z_score,
        confidence,
        mean_price: Some(mean),
        std_price: Some(std),
        num_historical_prices: prices.len(),
        price_deviation: Some(deviation),
        price_deviation_pct: deviation_pct,
        message: None,
    }
}
