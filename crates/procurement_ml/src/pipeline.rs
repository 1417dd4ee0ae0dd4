//! Training orchestration.
//!
//! Runs the full batch sequence: ensure the feature-store schema, extract
//! every source table once, compute and persist the three feature
//! families, train each model independently, persist predictions, and
//! write one timestamped report. A single model failing is recorded in
//! the report and never aborts its siblings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use config::Config;
use datasource::{create_pool, DataExtractor, ExtractedData};
use feature_store::FeatureStore;
use features::{
    compute_job_features, compute_price_features, compute_supplier_features, FeatureSet,
};
use models::{
    AnomalyPrediction, ForestParams, PriceAnomalyDetector, ProfitPrediction, ProfitPredictor,
    RegressionTrainingConfig, SupplierTrend, SupplierTrendModel,
};
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::Serialize;
use tracing::{error, info, warn};

/// Outcome of one model's training within a run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Success { metrics: serde_json::Value },
    Skipped { reason: String },
    Failed { error: String },
}

/// The per-run report written next to the model artifacts.
#[derive(Debug, Serialize)]
pub struct TrainingReport {
    pub training_completed_at: DateTime<Utc>,
    pub models: BTreeMap<String, ModelOutcome>,
}

/// Everything a training pass produces besides the report itself.
pub struct TrainingRun {
    pub report: TrainingReport,
    pub anomaly_predictions: Vec<AnomalyPrediction>,
    pub risky_suppliers: Vec<SupplierTrend>,
    pub profit_predictions: Vec<ProfitPrediction>,
}

/// Trains all three models over one extracted snapshot.
///
/// Each model is gated on its raw input size, trained, evaluated, and
/// saved inside its own fallible block; errors become `failed` report
/// entries rather than propagating.
pub async fn train_all_models(
    data: &ExtractedData,
    config: &Config,
    artifact_store: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> TrainingRun {
    let mut outcomes = BTreeMap::new();
    let mut anomaly_predictions = Vec::new();
    let mut risky_suppliers = Vec::new();
    let mut profit_predictions = Vec::new();

    info!("Training price anomaly detector");
    let outcome = if data.po_line_items.len() < config.min_training_samples {
        warn!(
            rows = data.po_line_items.len(),
            "Skipping price anomaly training"
        );
        ModelOutcome::Skipped {
            reason: format!(
                "insufficient data: {} purchase-order line items",
                data.po_line_items.len()
            ),
        }
    } else {
        match train_price_anomaly(data, config, artifact_store, now).await {
            Ok((metrics, predictions)) => {
                anomaly_predictions = predictions;
                ModelOutcome::Success { metrics }
            }
            Err(e) => {
                error!(error = %e, "Price anomaly training failed");
                ModelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    };
    outcomes.insert("price_anomaly".to_string(), outcome);

    info!("Training supplier trend model");
    let outcome = if data.price_history.is_empty() {
        warn!("Skipping supplier trend analysis");
        ModelOutcome::Skipped {
            reason: "no price history available".to_string(),
        }
    } else {
        match train_supplier_trend(data, config, artifact_store, now).await {
            Ok((metrics, risky)) => {
                risky_suppliers = risky;
                ModelOutcome::Success { metrics }
            }
            Err(e) => {
                error!(error = %e, "Supplier trend analysis failed");
                ModelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    };
    outcomes.insert("supplier_trend".to_string(), outcome);

    info!("Training profit predictor");
    let outcome = if data.constructions.len() < config.min_training_samples {
        warn!(
            rows = data.constructions.len(),
            "Skipping profit predictor training"
        );
        ModelOutcome::Skipped {
            reason: format!(
                "insufficient data: {} constructions",
                data.constructions.len()
            ),
        }
    } else {
        match train_profit_predictor(data, config, artifact_store, now).await {
            Ok((metrics, predictions)) => {
                profit_predictions = predictions;
                ModelOutcome::Success { metrics }
            }
            Err(e) => {
                error!(error = %e, "Profit predictor training failed");
                ModelOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    };
    outcomes.insert("profit_predictor".to_string(), outcome);

    TrainingRun {
        report: TrainingReport {
            training_completed_at: now,
            models: outcomes,
        },
        anomaly_predictions,
        risky_suppliers,
        profit_predictions,
    }
}

async fn train_price_anomaly(
    data: &ExtractedData,
    config: &Config,
    artifact_store: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> anyhow::Result<(serde_json::Value, Vec<AnomalyPrediction>)> {
    let features = compute_price_features(&data.po_line_items, now);

    let params = ForestParams {
        n_estimators: config.anomaly.n_estimators,
        max_samples: config.anomaly.max_samples,
        contamination: config.anomaly.contamination,
        seed: config.anomaly.seed,
    };
    let mut detector = PriceAnomalyDetector::new(config.model_version.clone(), params);

    let metrics = detector.train(&features, config.min_training_samples)?;
    let predictions = detector.predict(&features)?;
    detector.save(artifact_store, now).await?;

    Ok((serde_json::to_value(&metrics)?, predictions))
}

async fn train_supplier_trend(
    data: &ExtractedData,
    config: &Config,
    artifact_store: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> anyhow::Result<(serde_json::Value, Vec<SupplierTrend>)> {
    let mut model = SupplierTrendModel::new(config.model_version.clone());
    let metrics = model.analyze(&data.price_history, now, config.risk_threshold);

    if model.trends().is_empty() {
        anyhow::bail!("no supplier has enough price-change events to analyze");
    }

    let risky: Vec<SupplierTrend> = model
        .predict_risky(config.risk_threshold)?
        .into_iter()
        .cloned()
        .collect();
    model.save(artifact_store, now).await?;

    Ok((serde_json::to_value(&metrics)?, risky))
}

async fn train_profit_predictor(
    data: &ExtractedData,
    config: &Config,
    artifact_store: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> anyhow::Result<(serde_json::Value, Vec<ProfitPrediction>)> {
    let features = compute_job_features(&data.constructions);

    let mut predictor = ProfitPredictor::new(
        config.model_version.clone(),
        RegressionTrainingConfig::default(),
    );

    let metrics = predictor.train(&features, config.min_training_samples)?;
    let predictions = predictor.predict(&features)?;
    predictor.save(artifact_store, now).await?;

    Ok((serde_json::to_value(&metrics)?, predictions))
}

/// Runs the complete training pipeline end to end.
///
/// # Errors
///
/// Returns an error if extraction, feature persistence, or report writing
/// fails. Per-model training failures do not error here; they are
/// reported in the returned [`TrainingReport`].
pub async fn run(config: &Config) -> anyhow::Result<TrainingReport> {
    let started = Utc::now();
    info!("Starting ML training pipeline");

    let pool = create_pool(&config.database_url).await?;

    let store = FeatureStore::new(&pool);
    store.create_tables().await?;

    let extractor = DataExtractor::new(&pool);
    let data = extractor.extract_all(config.lookback_days).await?;
    info!(
        po_line_items = data.po_line_items.len(),
        constructions = data.constructions.len(),
        suppliers = data.suppliers.len(),
        pricebook_items = data.pricebook_items.len(),
        price_history = data.price_history.len(),
        "Data extraction summary"
    );

    let now = Utc::now();
    persist_features(&store, &data, now).await?;

    std::fs::create_dir_all(&config.models_dir)?;
    let artifact_store = LocalFileSystem::new_with_prefix(&config.models_dir)?;

    let run = train_all_models(&data, config, &artifact_store, now).await;

    persist_predictions(&store, config, &run).await?;
    save_report(&artifact_store, &run.report, now).await?;

    let elapsed = (Utc::now() - started).num_seconds();
    info!(elapsed_secs = elapsed, "Training pipeline complete");
    Ok(run.report)
}

async fn persist_features(
    store: &FeatureStore<'_>,
    data: &ExtractedData,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let price_features = compute_price_features(&data.po_line_items, now);
    info!(count = price_features.len(), "Computed price features");
    store_all(store, &price_features).await?;

    let supplier_features = compute_supplier_features(&data.suppliers);
    info!(count = supplier_features.len(), "Computed supplier features");
    store_all(store, &supplier_features).await?;

    let job_features = compute_job_features(&data.constructions);
    info!(count = job_features.len(), "Computed job features");
    store_all(store, &job_features).await?;

    Ok(())
}

async fn store_all<F: FeatureSet>(
    store: &FeatureStore<'_>,
    records: &[F],
) -> anyhow::Result<()> {
    for record in records {
        store.store_features(record).await?;
    }
    Ok(())
}

async fn persist_predictions(
    store: &FeatureStore<'_>,
    config: &Config,
    run: &TrainingRun,
) -> anyhow::Result<()> {
    for p in &run.anomaly_predictions {
        store
            .store_prediction(
                "price_anomaly",
                &config.model_version,
                p.pricebook_item_id,
                "pricebook_item",
                serde_json::to_value(p)?,
                Some(p.confidence),
            )
            .await?;
    }

    for t in &run.risky_suppliers {
        store
            .store_prediction(
                "supplier_trend",
                &config.model_version,
                t.supplier_id,
                "supplier",
                serde_json::to_value(t)?,
                Some(t.risk_score),
            )
            .await?;
    }

    for p in &run.profit_predictions {
        store
            .store_prediction(
                "profit_predictor",
                &config.model_version,
                p.construction_id,
                "construction",
                serde_json::to_value(p)?,
                None,
            )
            .await?;
    }

    info!(
        anomaly = run.anomaly_predictions.len(),
        risky_suppliers = run.risky_suppliers.len(),
        profit = run.profit_predictions.len(),
        "Predictions persisted"
    );
    Ok(())
}

async fn save_report(
    artifact_store: &dyn ObjectStore,
    report: &TrainingReport,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let path = ObjectPath::from(format!(
        "training_report_{}.json",
        now.format("%Y%m%d_%H%M%S")
    ));
    let bytes = serde_json::to_vec_pretty(report)?;
    artifact_store.put(&path, bytes.into()).await?;

    info!(path = %path, "Training report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Duration;
    use config::AnomalyParams;
    use datasource::{ConstructionRecord, PoLineItem, PriceHistoryRecord};
    use object_store::memory::InMemory;

    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://unused".to_string(),
            lookback_days: 365,
            min_training_samples: 50,
            models_dir: PathBuf::from("./models"),
            model_version: "v1".to_string(),
            risk_threshold: 0.6,
            anomaly: AnomalyParams::default(),
        }
    }

    fn line_item(id: i64, item_id: i64, price: f64, now: DateTime<Utc>) -> PoLineItem {
        PoLineItem {
            id,
            purchase_order_id: id,
            pricebook_item_id: Some(item_id),
            description: None,
            quantity: Some(2.0),
            unit_price: Some(price),
            total_amount: Some(price * 2.0),
            created_at: now - Duration::days(id % 200),
            supplier_id: Some(1),
            construction_id: Some(1),
            supplier_name: None,
            item_code: None,
            item_name: None,
            category: None,
        }
    }

    fn construction(id: i64, profit: Option<f64>) -> ConstructionRecord {
        let contract = 200_000.0 + 5_000.0 * id as f64;
        ConstructionRecord {
            id,
            title: None,
            contract_value: Some(contract),
            live_profit: Some(10_000.0),
            profit_percentage: profit,
            stage: Some("active".to_string()),
            status: Some("in_progress".to_string()),
            start_date: None,
            created_at: Utc::now(),
            purchase_orders_count: 4,
            total_po_value: contract * 0.5,
        }
    }

    fn price_change(
        supplier_id: i64,
        old: f64,
        new: f64,
        created_at: DateTime<Utc>,
    ) -> PriceHistoryRecord {
        PriceHistoryRecord {
            id: 0,
            pricebook_item_id: 1,
            old_price: Some(old),
            new_price: Some(new),
            supplier_id: Some(supplier_id),
            created_at,
            change_reason: None,
            date_effective: None,
            item_code: None,
            item_name: None,
            category: None,
        }
    }

    /// One model raising must not prevent the other two from producing
    /// successful report entries.
    #[tokio::test]
    async fn test_one_model_failing_does_not_abort_siblings() {
        let now = Utc::now();

        // 120 line items over 60 distinct items with varied prices: the
        // anomaly detector has plenty to train on.
        let po_line_items: Vec<PoLineItem> = (0..120)
            .map(|i| line_item(i, i % 60, 50.0 + (i % 13) as f64 * 7.0, now))
            .collect();

        // 60 constructions pass the raw-count gate, but only 10 carry a
        // profit target, so the regressor raises inside training.
        let constructions: Vec<ConstructionRecord> = (0..60)
            .map(|i| construction(i, if i < 10 { Some(15.0) } else { None }))
            .collect();

        let price_history = vec![
            price_change(7, 100.0, 105.0, now - Duration::days(90)),
            price_change(7, 105.0, 110.0, now - Duration::days(50)),
            price_change(7, 110.0, 116.0, now - Duration::days(10)),
        ];

        let data = ExtractedData {
            po_line_items,
            constructions,
            suppliers: Vec::new(),
            pricebook_items: Vec::new(),
            price_history,
        };

        let store = InMemory::new();
        let run = train_all_models(&data, &test_config(), &store, now).await;

        assert!(matches!(
            run.report.models["price_anomaly"],
            ModelOutcome::Success { .. }
        ));
        assert!(matches!(
            run.report.models["supplier_trend"],
            ModelOutcome::Success { .. }
        ));

        match &run.report.models["profit_predictor"] {
            ModelOutcome::Failed { error } => {
                assert!(error.contains("insufficient data"), "error = {error}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        assert!(!run.anomaly_predictions.is_empty());
        assert!(run.profit_predictions.is_empty());
    }

    #[tokio::test]
    async fn test_small_tables_skip_rather_than_fail() {
        let now = Utc::now();
        let data = ExtractedData {
            po_line_items: (0..5)
                .map(|i| line_item(i, i, 100.0, now))
                .collect(),
            constructions: (0..5).map(|i| construction(i, Some(20.0))).collect(),
            suppliers: Vec::new(),
            pricebook_items: Vec::new(),
            price_history: Vec::new(),
        };

        let store = InMemory::new();
        let run = train_all_models(&data, &test_config(), &store, now).await;

        for name in ["price_anomaly", "supplier_trend", "profit_predictor"] {
            assert!(
                matches!(run.report.models[name], ModelOutcome::Skipped { .. }),
                "{name} should be skipped"
            );
        }
    }

    #[tokio::test]
    async fn test_report_serializes_with_status_tags() {
        let now = Utc::now();
        let mut models = BTreeMap::new();
        models.insert(
            "price_anomaly".to_string(),
            ModelOutcome::Skipped {
                reason: "insufficient data: 3 purchase-order line items".to_string(),
            },
        );
        models.insert(
            "profit_predictor".to_string(),
            ModelOutcome::Failed {
                error: "boom".to_string(),
            },
        );

        let report = TrainingReport {
            training_completed_at: now,
            models,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["models"]["price_anomaly"]["status"], "skipped");
        assert_eq!(json["models"]["profit_predictor"]["status"], "failed");
        assert_eq!(json["models"]["profit_predictor"]["error"], "boom");
    }
}
