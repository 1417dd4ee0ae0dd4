//! Predictive models for the procurement pipeline.
//!
//! Three model families: an isolation-forest price anomaly detector, a
//! purely statistical supplier trend model, and a supervised profit
//! regressor. Each owns its fitted state together with the scaler and
//! ordered feature list it was trained with, and persists the whole bundle
//! as a single artifact so inference is never separated from the transform
//! that produced its training inputs.

mod anomaly;
mod artifact;
mod isolation_forest;
mod profit;
mod scaler;
mod supplier_trend;

pub use anomaly::{
    check_single_price, AnomalyPrediction, AnomalyTrainingMetrics, PriceAnomalyDetector,
    SinglePriceCheck,
};
pub use artifact::ModelArtifact;
pub use isolation_forest::{ForestParams, IsolationForest};
pub use profit::{
    ProfitPredictor, ProfitPrediction, ProfitTrainingMetrics, RegressionTrainingConfig,
};
pub use scaler::StandardScaler;
pub use supplier_trend::{
    SupplierTrend, SupplierTrendMetrics, SupplierTrendModel, TrendDirection,
};

/// Error raised by model training, inference, or artifact persistence.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Sample count below the configured training minimum. Expected and
    /// recoverable: the orchestrator skips the model for this run.
    #[error("insufficient data for training: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Inference attempted before training or loading. A contract
    /// violation, always fatal to the call.
    #[error("model not trained; call train() first or load a saved artifact")]
    NotTrained,

    /// The loaded artifact belongs to a different model family.
    #[error("wrong artifact family: expected {expected}, found {found}")]
    WrongArtifact {
        expected: &'static str,
        found: &'static str,
    },

    #[error("artifact storage failed: {0}")]
    Artifact(#[from] object_store::Error),

    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("training failed: {0}")]
    Training(String),
}
