//! Durable storage for computed features and model predictions.
//!
//! Two append-mostly tables in the same `PostgreSQL` database the extractor
//! reads from. Feature rows are immutable once written; re-running a
//! computation appends new rows with a fresh `computed_at`, so the history
//! of feature evolution is preserved. Every write commits independently, so
//! one failed insert never poisons its siblings.

use features::FeatureSet;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

mod scrub;

pub use scrub::scrub_json;

const FEATURES_TABLE: &str = "ml_features";
const PREDICTIONS_TABLE: &str = "ml_predictions";

/// Error raised by feature-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("feature store schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("feature store write failed: {0}")]
    Write(#[source] sqlx::Error),

    #[error("feature store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A stored feature row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredFeatures {
    pub id: i64,
    pub feature_type: String,
    pub entity_id: i64,
    pub entity_type: String,
    pub features: serde_json::Value,
    pub computed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored model prediction.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPrediction {
    pub id: i64,
    pub model_name: String,
    pub model_version: String,
    pub entity_id: i64,
    pub entity_type: String,
    pub prediction_value: serde_json::Value,
    pub confidence_score: Option<f64>,
    pub predicted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Manages ML features and predictions in `PostgreSQL`.
pub struct FeatureStore<'a> {
    pool: &'a PgPool,
}

impl<'a> FeatureStore<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Creates the feature and prediction tables if they do not exist.
    ///
    /// Idempotent; safe to invoke on every orchestrator run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if any DDL statement fails.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let statements = [
            format!(
                r"
                CREATE TABLE IF NOT EXISTS {FEATURES_TABLE} (
                    id BIGSERIAL PRIMARY KEY,
                    feature_type VARCHAR(50) NOT NULL,
                    entity_id BIGINT NOT NULL,
                    entity_type VARCHAR(50) NOT NULL,
                    features JSONB NOT NULL,
                    computed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_features_entity
                 ON {FEATURES_TABLE}(entity_type, entity_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_features_type
                 ON {FEATURES_TABLE}(feature_type)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_features_computed_at
                 ON {FEATURES_TABLE}(computed_at)"
            ),
            format!(
                r"
                CREATE TABLE IF NOT EXISTS {PREDICTIONS_TABLE} (
                    id BIGSERIAL PRIMARY KEY,
                    model_name VARCHAR(100) NOT NULL,
                    model_version VARCHAR(50) NOT NULL,
                    entity_id BIGINT NOT NULL,
                    entity_type VARCHAR(50) NOT NULL,
                    prediction_value JSONB NOT NULL,
                    confidence_score DOUBLE PRECISION,
                    predicted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_predictions_entity
                 ON {PREDICTIONS_TABLE}(entity_type, entity_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_predictions_model
                 ON {PREDICTIONS_TABLE}(model_name, model_version)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_predictions_predicted_at
                 ON {PREDICTIONS_TABLE}(predicted_at)"
            ),
        ];

        for statement in &statements {
            sqlx::query(sqlx::AssertSqlSafe(statement.as_str()))
                .execute(self.pool)
                .await
                .map_err(StoreError::Schema)?;
        }

        info!("Feature store tables ready");
        Ok(())
    }

    /// Appends one computed feature record.
    ///
    /// Uses conflict-ignore semantics: a reprocessed run that produces a
    /// duplicate-looking row is tolerated, never upserted. The payload is
    /// scrubbed of non-finite numbers before serialization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the insert fails; the failure is
    /// local to this row.
    pub async fn store_features<F: FeatureSet>(&self, record: &F) -> Result<(), StoreError> {
        let payload = scrub_json(serde_json::to_value(record)?);

        let query = format!(
            r"
            INSERT INTO {FEATURES_TABLE}
            (feature_type, entity_id, entity_type, features, computed_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT DO NOTHING
            "
        );

        sqlx::query(sqlx::AssertSqlSafe(query.as_str()))
            .bind(F::FEATURE_TYPE)
            .bind(record.entity_id())
            .bind(F::ENTITY_TYPE)
            .bind(&payload)
            .execute(self.pool)
            .await
            .map_err(StoreError::Write)?;

        debug!(
            entity_type = F::ENTITY_TYPE,
            entity_id = record.entity_id(),
            "Stored features"
        );
        Ok(())
    }

    /// Retrieves stored features for an entity, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the query fails.
    pub async fn get_features(
        &self,
        entity_type: &str,
        entity_id: i64,
        feature_type: Option<&str>,
    ) -> Result<Vec<StoredFeatures>, StoreError> {
        let rows = match feature_type {
            Some(feature_type) => {
                let query = format!(
                    "SELECT * FROM {FEATURES_TABLE}
                     WHERE entity_type = $1 AND entity_id = $2 AND feature_type = $3
                     ORDER BY computed_at DESC"
                );
                sqlx::query_as::<_, StoredFeatures>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(entity_type)
                    .bind(entity_id)
                    .bind(feature_type)
                    .fetch_all(self.pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT * FROM {FEATURES_TABLE}
                     WHERE entity_type = $1 AND entity_id = $2
                     ORDER BY computed_at DESC"
                );
                sqlx::query_as::<_, StoredFeatures>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(entity_type)
                    .bind(entity_id)
                    .fetch_all(self.pool)
                    .await
            }
        }
        .map_err(StoreError::Query)?;

        Ok(rows)
    }

    /// Appends one model prediction. Every training run is a new fact, so
    /// there is no conflict handling at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the insert fails.
    pub async fn store_prediction(
        &self,
        model_name: &str,
        model_version: &str,
        entity_id: i64,
        entity_type: &str,
        prediction_value: serde_json::Value,
        confidence_score: Option<f64>,
    ) -> Result<(), StoreError> {
        let payload = scrub_json(prediction_value);

        let query = format!(
            r"
            INSERT INTO {PREDICTIONS_TABLE}
            (model_name, model_version, entity_id, entity_type,
             prediction_value, confidence_score, predicted_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "
        );

        sqlx::query(sqlx::AssertSqlSafe(query.as_str()))
            .bind(model_name)
            .bind(model_version)
            .bind(entity_id)
            .bind(entity_type)
            .bind(&payload)
            .bind(confidence_score)
            .execute(self.pool)
            .await
            .map_err(StoreError::Write)?;

        debug!(model_name, entity_type, entity_id, "Stored prediction");
        Ok(())
    }

    /// Retrieves recent predictions from a model, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the query fails.
    pub async fn get_predictions(
        &self,
        model_name: &str,
        entity_type: Option<&str>,
        days_back: i32,
    ) -> Result<Vec<StoredPrediction>, StoreError> {
        let rows = match entity_type {
            Some(entity_type) => {
                let query = format!(
                    "SELECT * FROM {PREDICTIONS_TABLE}
                     WHERE model_name = $1
                       AND predicted_at >= NOW() - ($2::int * INTERVAL '1 day')
                       AND entity_type = $3
                     ORDER BY predicted_at DESC"
                );
                sqlx::query_as::<_, StoredPrediction>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(model_name)
                    .bind(days_back)
                    .bind(entity_type)
                    .fetch_all(self.pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT * FROM {PREDICTIONS_TABLE}
                     WHERE model_name = $1
                       AND predicted_at >= NOW() - ($2::int * INTERVAL '1 day')
                     ORDER BY predicted_at DESC"
                );
                sqlx::query_as::<_, StoredPrediction>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(model_name)
                    .bind(days_back)
                    .fetch_all(self.pool)
                    .await
            }
        }
        .map_err(StoreError::Query)?;

        Ok(rows)
    }
}
