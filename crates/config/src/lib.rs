//! Configuration for the procurement ML pipeline.
//!
//! A single [`Config`] is built once at process start and passed by
//! reference into every component constructor. Components never read the
//! environment themselves.

use std::path::PathBuf;

use anyhow::Context;

/// Parameters for the isolation-forest anomaly model.
#[derive(Debug, Clone)]
pub struct AnomalyParams {
    /// Number of trees in the forest.
    pub n_estimators: usize,
    /// Maximum number of samples drawn per tree.
    pub max_samples: usize,
    /// Expected proportion of anomalies, used for the decision threshold.
    pub contamination: f64,
    /// Seed for the tree-building RNG.
    pub seed: u64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PostgreSQL` connection string for the source database.
    pub database_url: String,

    /// How many days of history the extractor windows over.
    pub lookback_days: i32,

    /// Minimum sample count required to train any model.
    pub min_training_samples: usize,

    /// Directory for model artifact bundles and training reports.
    pub models_dir: PathBuf,

    /// Version tag stamped into every artifact and prediction.
    pub model_version: String,

    /// Risk score threshold for flagging suppliers.
    pub risk_threshold: f64,

    /// Isolation-forest parameters.
    pub anomaly: AnomalyParams,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string
    ///
    /// Optional environment variables:
    /// - `ML_LOOKBACK_DAYS`: extraction window in days (default: 365)
    /// - `ML_MIN_TRAINING_SAMPLES`: minimum training sample count (default: 50)
    /// - `ML_MODELS_DIR`: artifact directory (default: `./models`)
    /// - `ML_MODEL_VERSION`: version tag (default: `v1`)
    /// - `ML_RISK_THRESHOLD`: supplier risk threshold (default: 0.6)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// numeric variable fails to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let lookback_days = env_parsed("ML_LOOKBACK_DAYS", 365)?;
        let min_training_samples = env_parsed("ML_MIN_TRAINING_SAMPLES", 50)?;
        let risk_threshold = env_parsed("ML_RISK_THRESHOLD", 0.6)?;

        let models_dir = std::env::var("ML_MODELS_DIR")
            .map_or_else(|_| PathBuf::from("./models"), PathBuf::from);

        let model_version =
            std::env::var("ML_MODEL_VERSION").unwrap_or_else(|_| "v1".to_string());

        Ok(Self {
            database_url,
            lookback_days,
            min_training_samples,
            models_dir,
            model_version,
            risk_threshold,
            anomaly: AnomalyParams::default(),
        })
    }
}

fn env_parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} is not a valid value: {raw}")),
        Err(_) => Ok(default),
    }
}
