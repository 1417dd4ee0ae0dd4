//! Supplier price-trend analysis and risk scoring.
//!
//! Purely statistical, no fitted estimator: per-supplier percentage price
//! deltas, increase frequency, and recency are combined into a 0-1 risk
//! score. "Predict" is a pure filter over the analyzed trends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use datasource::PriceHistoryRecord;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ModelArtifact, ModelError};

/// Minimum price-change events before a supplier's trend is analyzed.
const MIN_CHANGE_EVENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

/// Analyzed trend for one supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierTrend {
    pub supplier_id: i64,
    pub avg_price_increase_pct: f64,
    pub price_increase_frequency: f64,
    pub num_price_changes: usize,
    pub num_increases: usize,
    pub num_decreases: usize,
    pub days_since_last_change: i64,
    pub trend_direction: TrendDirection,
    /// Unweighted mean of three clamped components: increase frequency,
    /// mean % increase / 10, and a 365-day linear recency decay.
    pub risk_score: f64,
}

/// Metrics reported after a trend-analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct SupplierTrendMetrics {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub num_suppliers_analyzed: usize,
    pub high_risk_suppliers: usize,
}

/// Heuristic price-increase risk model over supplier price history.
pub struct SupplierTrendModel {
    model_version: String,
    supplier_trends: BTreeMap<i64, SupplierTrend>,
}

impl SupplierTrendModel {
    #[must_use]
    pub const fn new(model_version: String) -> Self {
        Self {
            model_version,
            supplier_trends: BTreeMap::new(),
        }
    }

    /// Analyzes price trends for every supplier with at least three
    /// price-change events, replacing any previous analysis. Records with
    /// no supplier or no usable old/new price are skipped.
    pub fn analyze(
        &mut self,
        history: &[PriceHistoryRecord],
        now: DateTime<Utc>,
        risk_threshold: f64,
    ) -> SupplierTrendMetrics {
        info!("Analyzing supplier price trends");

        let mut by_supplier: BTreeMap<i64, Vec<&PriceHistoryRecord>> = BTreeMap::new();
        for record in history {
            let Some(supplier_id) = record.supplier_id else {
                continue;
            };
            if record.old_price.is_none() || record.new_price.is_none() {
                continue;
            }
            by_supplier.entry(supplier_id).or_default().push(record);
        }

        self.supplier_trends = by_supplier
            .into_iter()
            .filter(|(_, events)| events.len() >= MIN_CHANGE_EVENTS)
            .map(|(supplier_id, events)| {
                (supplier_id, analyze_one(supplier_id, &events, now))
            })
            .collect();

        let high_risk = self
            .supplier_trends
            .values()
            .filter(|t| t.risk_score >= risk_threshold)
            .count();

        info!(
            num_suppliers = self.supplier_trends.len(),
            high_risk, "Supplier trend analysis complete"
        );

        SupplierTrendMetrics {
            model_version: self.model_version.clone(),
            trained_at: now,
            num_suppliers_analyzed: self.supplier_trends.len(),
            high_risk_suppliers: high_risk,
        }
    }

    /// All analyzed trends, keyed by supplier id.
    #[must_use]
    pub const fn trends(&self) -> &BTreeMap<i64, SupplierTrend> {
        &self.supplier_trends
    }

    /// Suppliers whose risk score meets the threshold, highest risk first.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] when no analysis has run yet;
    /// an empty result after analysis means genuinely no risky suppliers.
    pub fn predict_risky(&self, threshold: f64) -> Result<Vec<&SupplierTrend>, ModelError> {
        if self.supplier_trends.is_empty() {
            return Err(ModelError::NotTrained);
        }

        let mut risky: Vec<&SupplierTrend> = self
            .supplier_trends
            .values()
            .filter(|t| t.risk_score >= threshold)
            .collect();
        risky.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(count = risky.len(), threshold, "Identified high-risk suppliers");
        Ok(risky)
    }

    /// Bundles the analyzed trends into an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] when no analysis has run.
    pub fn to_artifact(&self, saved_at: DateTime<Utc>) -> Result<ModelArtifact, ModelError> {
        if self.supplier_trends.is_empty() {
            return Err(ModelError::NotTrained);
        }

        Ok(ModelArtifact::SupplierTrend {
            supplier_trends: self.supplier_trends.clone(),
            model_version: self.model_version.clone(),
            saved_at,
        })
    }

    /// Restores a model from a saved artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WrongArtifact`] for any other family.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        match artifact {
            ModelArtifact::SupplierTrend {
                supplier_trends,
                model_version,
                ..
            } => Ok(Self {
                model_version,
                supplier_trends,
            }),
            other => Err(ModelError::WrongArtifact {
                expected: "supplier_trend",
                found: other.family(),
            }),
        }
    }

    /// Saves the analyzed trends to the artifact store.
    ///
    /// # Errors
    ///
    /// Returns an error if no analysis has run or the write fails.
    pub async fn save(
        &self,
        store: &dyn ObjectStore,
        now: DateTime<Utc>,
    ) -> Result<ObjectPath, ModelError> {
        self.to_artifact(now)?.save(store, now).await
    }

    /// Loads a model from a saved bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing, malformed, or from a
    /// different model family.
    pub async fn load(store: &dyn ObjectStore, path: &ObjectPath) -> Result<Self, ModelError> {
        Self::from_artifact(ModelArtifact::load(store, path).await?)
    }
}

fn analyze_one(
    supplier_id: i64,
    events: &[&PriceHistoryRecord],
    now: DateTime<Utc>,
) -> SupplierTrend {
    let mut pct_changes = Vec::with_capacity(events.len());
    let mut num_increases = 0;
    let mut num_decreases = 0;
    let mut last_change = events[0].created_at;

    for event in events {
        let old = event.old_price.unwrap_or(0.0);
        let new = event.new_price.unwrap_or(0.0);
        let delta = new - old;

        if delta > 0.0 {
            num_increases += 1;
        } else if delta < 0.0 {
            num_decreases += 1;
        }

        pct_changes.push(if old.abs() > f64::EPSILON {
            delta / old * 100.0
        } else {
            0.0
        });

        if event.created_at > last_change {
            last_change = event.created_at;
        }
    }

    let total = pct_changes.len();
    let avg_pct = pct_changes.iter().sum::<f64>() / total as f64;
    let increase_frequency = num_increases as f64 / total as f64;
    let days_since_last_change = (now - last_change).num_days().max(0);

    let trend_direction = if avg_pct > 2.0 {
        TrendDirection::Increasing
    } else if avg_pct < -2.0 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let risk_components = [
        increase_frequency,
        if avg_pct > 0.0 {
            (avg_pct / 10.0).min(1.0)
        } else {
            0.0
        },
        (1.0 - days_since_last_change as f64 / 365.0).max(0.0),
    ];
    let risk_score = risk_components.iter().sum::<f64>() / risk_components.len() as f64;

    SupplierTrend {
        supplier_id,
        avg_price_increase_pct: avg_pct,
        price_increase_frequency: increase_frequency,
        num_price_changes: total,
        num_increases,
        num_decreases,
        days_since_last_change,
        trend_direction,
        risk_score,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use object_store::memory::InMemory;

    use super::*;

    fn change(
        supplier_id: i64,
        old_price: f64,
        new_price: f64,
        created_at: DateTime<Utc>,
    ) -> PriceHistoryRecord {
        PriceHistoryRecord {
            id: 0,
            pricebook_item_id: 1,
            old_price: Some(old_price),
            new_price: Some(new_price),
            supplier_id: Some(supplier_id),
            created_at,
            change_reason: None,
            date_effective: None,
            item_code: None,
            item_name: None,
            category: None,
        }
    }

    fn rising_supplier(now: DateTime<Utc>) -> Vec<PriceHistoryRecord> {
        // Four increases of 5% each, most recent 10 days ago.
        vec![
            change(7, 100.0, 105.0, now - Duration::days(100)),
            change(7, 105.0, 110.25, now - Duration::days(70)),
            change(7, 110.25, 115.7625, now - Duration::days(40)),
            change(7, 115.7625, 121.550_625, now - Duration::days(10)),
        ]
    }

    #[test]
    fn test_rising_supplier_scored_increasing() {
        let now = Utc::now();
        let mut model = SupplierTrendModel::new("v1".to_string());
        let metrics = model.analyze(&rising_supplier(now), now, 0.6);

        assert_eq!(metrics.num_suppliers_analyzed, 1);

        let trend = &model.trends()[&7];
        assert_eq!(trend.trend_direction, TrendDirection::Increasing);
        assert_eq!(trend.num_increases, 4);
        assert_eq!(trend.num_decreases, 0);
        assert!((trend.avg_price_increase_pct - 5.0).abs() < 1e-9);

        // frequency 1.0, pct component 0.5, recency 1 - 10/365.
        let recency = 1.0 - 10.0 / 365.0;
        let expected = (1.0 + 0.5 + recency) / 3.0;
        assert!((trend.risk_score - expected).abs() < 1e-9);
        assert!(trend.risk_score > recency / 3.0);
        assert!(trend.risk_score < 1.0);
    }

    #[test]
    fn test_suppliers_with_few_events_skipped() {
        let now = Utc::now();
        let mut history = rising_supplier(now);
        history.push(change(8, 100.0, 90.0, now - Duration::days(5)));
        history.push(change(8, 90.0, 80.0, now - Duration::days(2)));

        let mut model = SupplierTrendModel::new("v1".to_string());
        model.analyze(&history, now, 0.6);

        assert!(model.trends().contains_key(&7));
        assert!(!model.trends().contains_key(&8));
    }

    #[test]
    fn test_falling_prices_scored_decreasing_and_low_risk() {
        let now = Utc::now();
        let history = vec![
            change(3, 100.0, 90.0, now - Duration::days(400)),
            change(3, 90.0, 80.0, now - Duration::days(390)),
            change(3, 80.0, 70.0, now - Duration::days(380)),
        ];

        let mut model = SupplierTrendModel::new("v1".to_string());
        model.analyze(&history, now, 0.6);

        let trend = &model.trends()[&3];
        assert_eq!(trend.trend_direction, TrendDirection::Decreasing);
        // No increases, negative mean change, last change beyond the
        // 365-day decay window.
        assert_eq!(trend.risk_score, 0.0);
    }

    #[test]
    fn test_predict_before_analyze_is_contract_violation() {
        let model = SupplierTrendModel::new("v1".to_string());
        assert!(matches!(
            model.predict_risky(0.6).unwrap_err(),
            ModelError::NotTrained
        ));
    }

    #[test]
    fn test_predict_filters_and_sorts_by_risk() {
        let now = Utc::now();
        let mut history = rising_supplier(now);
        history.extend(vec![
            change(3, 100.0, 90.0, now - Duration::days(400)),
            change(3, 90.0, 80.0, now - Duration::days(390)),
            change(3, 80.0, 70.0, now - Duration::days(380)),
        ]);

        let mut model = SupplierTrendModel::new("v1".to_string());
        model.analyze(&history, now, 0.6);

        let risky = model.predict_risky(0.6).unwrap();
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].supplier_id, 7);

        let all = model.predict_risky(0.0).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].risk_score >= all[1].risk_score);
    }

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let now = Utc::now();
        let mut model = SupplierTrendModel::new("v1".to_string());
        model.analyze(&rising_supplier(now), now, 0.6);

        let store = InMemory::new();
        let path = model.save(&store, now).await.unwrap();

        let restored = SupplierTrendModel::load(&store, &path).await.unwrap();
        assert_eq!(restored.trends().len(), 1);
        assert!(
            (restored.trends()[&7].risk_score - model.trends()[&7].risk_score).abs() < 1e-12
        );
    }
}
