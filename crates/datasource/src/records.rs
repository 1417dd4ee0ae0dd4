//! Raw record types returned by the extractor.
//!
//! All of these are immutable snapshots of externally owned tables; this
//! service never writes them back.

use chrono::{DateTime, NaiveDate, Utc};

/// One purchase-order line item, with join-resolved supplier and
/// pricebook attributes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PoLineItem {
    pub id: i64,
    pub purchase_order_id: i64,
    pub pricebook_item_id: Option<i64>,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub supplier_id: Option<i64>,
    pub construction_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub category: Option<String>,
}

/// One construction job with purchase-order aggregates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConstructionRecord {
    pub id: i64,
    pub title: Option<String>,
    pub contract_value: Option<f64>,
    pub live_profit: Option<f64>,
    pub profit_percentage: Option<f64>,
    pub stage: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub purchase_orders_count: i64,
    pub total_po_value: f64,
}

/// One supplier with purchase-order aggregates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplierRecord {
    pub id: i64,
    pub name: Option<String>,
    pub rating: Option<i32>,
    pub response_rate: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub is_active: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub total_purchase_orders: i64,
    pub total_po_value: f64,
    pub avg_po_value: f64,
}

/// One active pricebook item.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricebookItem {
    pub id: i64,
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub category: Option<String>,
    pub current_price: Option<f64>,
    pub supplier_id: Option<i64>,
    pub is_active: bool,
    pub price_last_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One price-change event for a pricebook item.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRecord {
    pub id: i64,
    pub pricebook_item_id: i64,
    pub old_price: Option<f64>,
    pub new_price: Option<f64>,
    pub supplier_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub change_reason: Option<String>,
    pub date_effective: Option<NaiveDate>,
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub category: Option<String>,
}

/// One purchase of a specific item, from its full history.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemPurchase {
    pub id: i64,
    pub unit_price: Option<f64>,
    pub quantity: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub item_code: Option<String>,
    pub item_name: Option<String>,
}

/// All source tables needed for one training run.
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub po_line_items: Vec<PoLineItem>,
    pub constructions: Vec<ConstructionRecord>,
    pub suppliers: Vec<SupplierRecord>,
    pub pricebook_items: Vec<PricebookItem>,
    pub price_history: Vec<PriceHistoryRecord>,
}
