//! Supervised profit-percentage regression over job features.
//!
//! A single linear layer trained with Adam on standardized inputs. The
//! fitted weights are extracted into plain coefficients after training, so
//! inference and persistence need no tensor backend.

use std::collections::BTreeMap;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use chrono::{DateTime, Utc};
use features::JobFeatures;
use ndarray::Array2;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::Serialize;
use tracing::info;

use crate::scaler::StandardScaler;
use crate::{ModelArtifact, ModelError};

type TrainBackend = Autodiff<NdArray>;

/// Ordered feature list the regressor trains on.
pub const PROFIT_FEATURE_NAMES: [&str; 4] = [
    "contract_value",
    "total_po_value",
    "purchase_orders_count",
    "po_to_contract_ratio",
];

/// Training hyperparameters for the regressor.
#[derive(Debug, Clone)]
pub struct RegressionTrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Seed for the train/test split shuffle; fixed so evaluation is
    /// reproducible across runs.
    pub seed: u64,
    pub test_split: f64,
}

impl Default for RegressionTrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 800,
            learning_rate: 0.1,
            seed: 42,
            test_split: 0.2,
        }
    }
}

/// Metrics reported after training the regressor.
#[derive(Debug, Clone, Serialize)]
pub struct ProfitTrainingMetrics {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub num_samples: usize,
    pub num_train: usize,
    pub num_test: usize,
    pub train_r2: f64,
    pub test_r2: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Normalized absolute coefficient per feature, summing to 1.
    pub feature_importance: BTreeMap<String, f64>,
}

/// Predicted profit percentage for one job.
#[derive(Debug, Clone, Serialize)]
pub struct ProfitPrediction {
    pub construction_id: i64,
    pub predicted_profit_pct: f64,
}

#[derive(Module, Debug)]
struct RegressionModel<B: Backend> {
    linear: Linear<B>,
}

struct FittedState {
    weights: Vec<f64>,
    bias: f64,
    scaler: StandardScaler,
}

impl FittedState {
    fn predict_matrix(&self, matrix: &Array2<f64>) -> Vec<f64> {
        let scaled = self.scaler.transform(matrix);
        (0..scaled.nrows())
            .map(|i| {
                self.weights
                    .iter()
                    .enumerate()
                    .map(|(j, w)| scaled[[i, j]] * w)
                    .sum::<f64>()
                    + self.bias
            })
            .collect()
    }
}

/// Linear profit-percentage regressor over job features.
pub struct ProfitPredictor {
    model_version: String,
    config: RegressionTrainingConfig,
    state: Option<FittedState>,
}

impl ProfitPredictor {
    #[must_use]
    pub const fn new(model_version: String, config: RegressionTrainingConfig) -> Self {
        Self {
            model_version,
            config,
            state: None,
        }
    }

    fn feature_row(features: &JobFeatures) -> [f64; 4] {
        [
            features.contract_value,
            features.total_po_value,
            features.purchase_orders_count as f64,
            features.po_to_contract_ratio,
        ]
    }

    /// Trains the regressor on jobs that carry a profit target. Rows with
    /// a missing target are excluded, never imputed.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InsufficientData`] when fewer than
    /// `min_samples` labeled rows remain, or [`ModelError::Training`] if
    /// the tensor backend fails.
    pub fn train(
        &mut self,
        features: &[JobFeatures],
        min_samples: usize,
    ) -> Result<ProfitTrainingMetrics, ModelError> {
        info!("Starting profit predictor training");

        let labeled: Vec<(&JobFeatures, f64)> = features
            .iter()
            .filter_map(|f| f.profit_percentage.map(|target| (f, target)))
            .collect();

        if labeled.len() < min_samples {
            return Err(ModelError::InsufficientData {
                needed: min_samples,
                got: labeled.len(),
            });
        }

        let n = labeled.len();
        let mut indices: Vec<usize> = (0..n).collect();
        shuffle_indices(&mut indices, self.config.seed);

        let n_test = ((n as f64 * self.config.test_split).round() as usize)
            .max(1)
            .min(n - 1);
        let (test_idx, train_idx) = indices.split_at(n_test);

        let to_matrix = |idx: &[usize]| {
            Array2::from_shape_fn((idx.len(), 4), |(i, j)| {
                Self::feature_row(labeled[idx[i]].0)[j]
            })
        };
        let targets_of = |idx: &[usize]| -> Vec<f64> {
            idx.iter().map(|&i| labeled[i].1).collect()
        };

        let train_matrix = to_matrix(train_idx);
        let test_matrix = to_matrix(test_idx);
        let train_targets = targets_of(train_idx);
        let test_targets = targets_of(test_idx);

        // Scaler statistics come from the training split only.
        let (scaler, train_scaled) = StandardScaler::fit_transform(&train_matrix);

        let (weights, bias) = fit_linear(&train_scaled, &train_targets, &self.config)?;
        let state = FittedState {
            weights,
            bias,
            scaler,
        };

        let train_pred = state.predict_matrix(&train_matrix);
        let test_pred = state.predict_matrix(&test_matrix);

        let mae = test_pred
            .iter()
            .zip(&test_targets)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / test_targets.len() as f64;
        let rmse = (test_pred
            .iter()
            .zip(&test_targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / test_targets.len() as f64)
            .sqrt();

        let abs_sum: f64 = state.weights.iter().map(|w| w.abs()).sum();
        let feature_importance = PROFIT_FEATURE_NAMES
            .iter()
            .zip(&state.weights)
            .map(|(name, w)| {
                let share = if abs_sum > f64::EPSILON {
                    w.abs() / abs_sum
                } else {
                    0.0
                };
                ((*name).to_string(), share)
            })
            .collect();

        let metrics = ProfitTrainingMetrics {
            model_version: self.model_version.clone(),
            trained_at: Utc::now(),
            num_samples: n,
            num_train: train_idx.len(),
            num_test: test_idx.len(),
            train_r2: r_squared(&train_pred, &train_targets),
            test_r2: r_squared(&test_pred, &test_targets),
            mae,
            rmse,
            feature_importance,
        };

        self.state = Some(state);

        info!(
            num_samples = n,
            test_r2 = metrics.test_r2,
            "Profit predictor training complete"
        );
        Ok(metrics)
    }

    /// Predicts profit percentage for every job row, labeled or not.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] before `train` or `load`.
    pub fn predict(
        &self,
        features: &[JobFeatures],
    ) -> Result<Vec<ProfitPrediction>, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained)?;

        if features.is_empty() {
            return Ok(Vec::new());
        }

        let matrix = Array2::from_shape_fn((features.len(), 4), |(i, j)| {
            Self::feature_row(&features[i])[j]
        });
        let predicted = state.predict_matrix(&matrix);

        Ok(features
            .iter()
            .zip(predicted)
            .map(|(f, value)| ProfitPrediction {
                construction_id: f.construction_id,
                predicted_profit_pct: value,
            })
            .collect())
    }

    /// Bundles the fitted coefficients into an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] when there is nothing to save.
    pub fn to_artifact(&self, saved_at: DateTime<Utc>) -> Result<ModelArtifact, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained)?;

        Ok(ModelArtifact::ProfitPredictor {
            weights: state.weights.clone(),
            bias: state.bias,
            scaler: state.scaler.clone(),
            feature_names: PROFIT_FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            model_version: self.model_version.clone(),
            saved_at,
        })
    }

    /// Restores a predictor from a saved artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WrongArtifact`] for any other family.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        match artifact {
            ModelArtifact::ProfitPredictor {
                weights,
                bias,
                scaler,
                model_version,
                ..
            } => Ok(Self {
                model_version,
                config: RegressionTrainingConfig::default(),
                state: Some(FittedState {
                    weights,
                    bias,
                    scaler,
                }),
            }),
            other => Err(ModelError::WrongArtifact {
                expected: "profit_predictor",
                found: other.family(),
            }),
        }
    }

    /// Saves the fitted coefficients to the artifact store.
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

    /// Loads a predictor from a saved bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing, malformed, or from a
    /// different model family.
    pub async fn load(store: &dyn ObjectStore, path: &ObjectPath) -> Result<Self, ModelError> {
        Self::from_artifact(ModelArtifact::load(store, path).await?)
    }
}

/// Fits a single linear layer with full-batch Adam and MSE loss, then
/// extracts the coefficients.
fn fit_linear(
    scaled: &Array2<f64>,
    targets: &[f64],
    config: &RegressionTrainingConfig,
) -> Result<(Vec<f64>, f64), ModelError> {
    let device = NdArrayDevice::default();
    let n = scaled.nrows();
    let d = scaled.ncols();

    let inputs_flat: Vec<f32> = scaled.iter().map(|x| *x as f32).collect();
    let targets_flat: Vec<f32> = targets.iter().map(|x| *x as f32).collect();

    let inputs = Tensor::<TrainBackend, 1>::from_floats(inputs_flat.as_slice(), &device)
        .reshape([n, d]);
    let expected = Tensor::<TrainBackend, 1>::from_floats(targets_flat.as_slice(), &device)
        .reshape([n, 1]);

    let mut model = RegressionModel::<TrainBackend> {
        linear: LinearConfig::new(d, 1).with_bias(true).init(&device),
    };
    let mut optimizer = AdamConfig::new().init();
    let loss_fn = MseLoss::new();

    for _ in 0..config.epochs {
        let predictions = model.linear.forward(inputs.clone());
        let loss = loss_fn.forward(predictions, expected.clone(), Reduction::Mean);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(config.learning_rate, model, grads);
    }

    let weights: Vec<f64> = model
        .linear
        .weight
        .val()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ModelError::Training(format!("weight extraction failed: {e:?}")))?
        .into_iter()
        .map(f64::from)
        .collect();

    let bias = match &model.linear.bias {
        Some(bias) => bias
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ModelError::Training(format!("bias extraction failed: {e:?}")))?
            .first()
            .copied()
            .map(f64::from)
            .unwrap_or(0.0),
        None => 0.0,
    };

    Ok((weights, bias))
}

/// Coefficient of determination; 0 when the targets have no variance.
fn r_squared(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;

    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, y)| (y - p).powi(2))
        .sum();

    if ss_tot > f64::EPSILON {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    }
}

/// Fisher-Yates shuffle driven by a small LCG, so the split needs no RNG
/// crate state and stays identical across platforms.
fn shuffle_indices(indices: &mut [usize], seed: u64) {
    let mut rng_state = seed.wrapping_add(12345);

    for i in (1..indices.len()).rev() {
        rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = ((rng_state >> 33) as usize) % (i + 1);
        indices.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    fn job(id: i64, contract: f64, po_value: f64, po_count: i64, profit: Option<f64>) -> JobFeatures {
        JobFeatures {
            construction_id: id,
            contract_value: contract,
            live_profit: 0.0,
            profit_percentage: profit,
            total_po_value: po_value,
            purchase_orders_count: po_count,
            po_to_contract_ratio: if contract > 0.0 { po_value / contract } else { 0.0 },
            stage: "active".to_string(),
            status: "in_progress".to_string(),
        }
    }

    /// Noiseless linear ground truth over the job features.
    fn linear_jobs(n: usize) -> Vec<JobFeatures> {
        (0..n)
            .map(|i| {
                let contract = 200_000.0 + 6_000.0 * (i % 97) as f64;
                let po_value = contract * (0.4 + 0.1 * (i % 5) as f64);
                let po_count = 5 + (i % 10) as i64;
                let ratio = po_value / contract;
                let profit = 20.0 + contract / 50_000.0 - 10.0 * ratio;
                job(i as i64, contract, po_value, po_count, Some(profit))
            })
            .collect()
    }

    #[test]
    fn test_insufficient_labeled_rows() {
        // 60 jobs but only 10 carry a profit target.
        let mut jobs = linear_jobs(10);
        jobs.extend((10..60).map(|i| job(i as i64, 300_000.0, 150_000.0, 5, None)));

        let mut predictor =
            ProfitPredictor::new("v1".to_string(), RegressionTrainingConfig::default());
        let err = predictor.train(&jobs, 50).unwrap_err();

        match err {
            ModelError::InsufficientData { needed, got } => {
                assert_eq!(needed, 50);
                assert_eq!(got, 10);
            }
            other => panic!("expected InsufficientData, got {other}"),
        }
    }

    #[test]
    fn test_predict_before_train_is_contract_violation() {
        let predictor =
            ProfitPredictor::new("v1".to_string(), RegressionTrainingConfig::default());
        assert!(matches!(
            predictor.predict(&[]).unwrap_err(),
            ModelError::NotTrained
        ));
    }

    #[test]
    fn test_learns_linear_relationship() {
        let jobs = linear_jobs(120);
        let mut predictor =
            ProfitPredictor::new("v1".to_string(), RegressionTrainingConfig::default());

        let metrics = predictor.train(&jobs, 50).unwrap();

        assert_eq!(metrics.num_samples, 120);
        assert_eq!(metrics.num_train + metrics.num_test, 120);
        assert!(metrics.test_r2 > 0.8, "test_r2 = {}", metrics.test_r2);
        assert!(metrics.train_r2 > 0.8, "train_r2 = {}", metrics.train_r2);

        let importance_sum: f64 = metrics.feature_importance.values().sum();
        assert!((importance_sum - 1.0).abs() < 1e-9);

        let predictions = predictor.predict(&jobs).unwrap();
        assert_eq!(predictions.len(), 120);
        for (p, f) in predictions.iter().zip(&jobs) {
            assert_eq!(p.construction_id, f.construction_id);
            assert!(p.predicted_profit_pct.is_finite());
        }
    }

    #[test]
    fn test_unlabeled_rows_still_scored_at_inference() {
        let mut jobs = linear_jobs(100);
        let mut predictor =
            ProfitPredictor::new("v1".to_string(), RegressionTrainingConfig::default());
        predictor.train(&jobs, 50).unwrap();

        jobs.push(job(999, 400_000.0, 200_000.0, 8, None));
        let predictions = predictor.predict(&jobs).unwrap();

        assert_eq!(predictions.len(), 101);
        assert!(predictions
            .iter()
            .any(|p| p.construction_id == 999 && p.predicted_profit_pct.is_finite()));
    }

    #[tokio::test]
    async fn test_artifact_round_trip_preserves_predictions() {
        let jobs = linear_jobs(100);
        let mut predictor =
            ProfitPredictor::new("v1".to_string(), RegressionTrainingConfig::default());
        predictor.train(&jobs, 50).unwrap();

        let store = InMemory::new();
        let now = Utc::now();
        let path = predictor.save(&store, now).await.unwrap();

        let restored = ProfitPredictor::load(&store, &path).await.unwrap();

        let before = predictor.predict(&jobs).unwrap();
        let after = restored.predict(&jobs).unwrap();

        for (a, b) in before.iter().zip(&after) {
            assert!((a.predicted_profit_pct - b.predicted_profit_pct).abs() < 1e-9);
        }
    }

    #[test]
    fn test_inference_is_exact_dot_product_of_coefficients() {
        let predictor = ProfitPredictor::from_artifact(crate::ModelArtifact::ProfitPredictor {
            weights: vec![2.0, -1.0, 0.5, 10.0],
            bias: 3.0,
            scaler: StandardScaler {
                means: vec![0.0; 4],
                stds: vec![1.0; 4],
            },
            feature_names: PROFIT_FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            model_version: "v1".to_string(),
            saved_at: Utc::now(),
        })
        .unwrap();

        let jobs = vec![job(1, 100.0, 40.0, 6, None)];
        let predictions = predictor.predict(&jobs).unwrap();

        // 2*100 - 1*40 + 0.5*6 + 10*(40/100) + 3
        let expected = 200.0 - 40.0 + 3.0 + 4.0 + 3.0;
        assert!((predictions[0].predicted_profit_pct - expected).abs() < 1e-9);
    }

    #[test]
    fn test_shuffle_preserves_elements() {
        let mut indices: Vec<usize> = (0..50).collect();
        let original = indices.clone();

        shuffle_indices(&mut indices, 42);
        assert_ne!(indices, original);

        indices.sort_unstable();
        assert_eq!(indices, original);
    }
}
