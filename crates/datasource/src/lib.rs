//! Read-only extraction from the procurement database.
//!
//! All queries are parameterized, window on `created_at`, and return the
//! most recent rows first so consumers doing recency calculations can rely
//! on the ordering. Nothing here ever writes to a source table.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod records;

pub use records::{
    ConstructionRecord, ExtractedData, ItemPurchase, PoLineItem, PriceHistoryRecord,
    PricebookItem, SupplierRecord,
};

/// Error raised by any extraction query.
///
/// Connectivity and query failures are not retried here; the caller decides
/// whether the run can continue.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("data source query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Creates a connection pool to the `PostgreSQL` database.
///
/// The pool is the scope guard for every connection this service holds:
/// dropping it releases all connections, including after a failed query.
///
/// # Errors
///
/// Returns an error if the connection to the database fails.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Selector for a single pricebook item, by code or by id.
///
/// The two selectors are mutually exclusive by construction.
#[derive(Debug, Clone)]
pub enum ItemSelector {
    Code(String),
    Id(i64),
}

/// Extracts raw procurement data for ML processing.
///
/// Borrows the pool for the duration of one run; connections are acquired
/// lazily per query and returned when the pool is dropped.
pub struct DataExtractor<'a> {
    pool: &'a PgPool,
}

impl<'a> DataExtractor<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Extracts purchase-order line items from the last `days_back` days,
    /// most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extract_po_line_items(
        &self,
        days_back: i32,
    ) -> Result<Vec<PoLineItem>, DataSourceError> {
        info!(days_back, "Extracting PO line items");

        let rows = sqlx::query_as::<_, PoLineItem>(
            r"
            SELECT
                poli.id,
                poli.purchase_order_id,
                poli.pricebook_item_id,
                poli.description,
                poli.quantity::float8 AS quantity,
                poli.unit_price::float8 AS unit_price,
                poli.total_amount::float8 AS total_amount,
                poli.created_at,
                po.supplier_id,
                po.construction_id,
                s.name AS supplier_name,
                pb.item_code,
                pb.item_name,
                pb.category
            FROM purchase_order_line_items poli
            INNER JOIN purchase_orders po ON poli.purchase_order_id = po.id
            LEFT JOIN suppliers s ON po.supplier_id = s.id
            LEFT JOIN pricebook_items pb ON poli.pricebook_item_id = pb.id
            WHERE poli.created_at >= NOW() - ($1::int * INTERVAL '1 day')
            ORDER BY poli.created_at DESC
            ",
        )
        .bind(days_back)
        .fetch_all(self.pool)
        .await?;

        info!(rows = rows.len(), "Extracted PO line items");
        Ok(rows)
    }

    /// Extracts construction jobs with purchase-order aggregates from the
    /// last `days_back` days.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extract_constructions(
        &self,
        days_back: i32,
    ) -> Result<Vec<ConstructionRecord>, DataSourceError> {
        info!(days_back, "Extracting constructions");

        let rows = sqlx::query_as::<_, ConstructionRecord>(
            r"
            SELECT
                c.id,
                c.title,
                c.contract_value::float8 AS contract_value,
                c.live_profit::float8 AS live_profit,
                c.profit_percentage::float8 AS profit_percentage,
                c.stage,
                c.status,
                c.start_date,
                c.created_at,
                COUNT(DISTINCT po.id) AS purchase_orders_count,
                COALESCE(SUM(po.total), 0)::float8 AS total_po_value
            FROM constructions c
            LEFT JOIN purchase_orders po ON c.id = po.construction_id
            WHERE c.created_at >= NOW() - ($1::int * INTERVAL '1 day')
            GROUP BY c.id
            ORDER BY c.created_at DESC
            ",
        )
        .bind(days_back)
        .fetch_all(self.pool)
        .await?;

        info!(rows = rows.len(), "Extracted constructions");
        Ok(rows)
    }

    /// Extracts all suppliers with purchase-order aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extract_suppliers(&self) -> Result<Vec<SupplierRecord>, DataSourceError> {
        info!("Extracting suppliers");

        let rows = sqlx::query_as::<_, SupplierRecord>(
            r"
            SELECT
                s.id,
                s.name,
                s.rating,
                s.response_rate::float8 AS response_rate,
                s.avg_response_time::float8 AS avg_response_time,
                s.is_active,
                s.created_at,
                COUNT(DISTINCT po.id) AS total_purchase_orders,
                COALESCE(SUM(po.total), 0)::float8 AS total_po_value,
                COALESCE(AVG(po.total), 0)::float8 AS avg_po_value
            FROM suppliers s
            LEFT JOIN purchase_orders po ON s.id = po.supplier_id
            GROUP BY s.id
            ORDER BY total_purchase_orders DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        info!(rows = rows.len(), "Extracted suppliers");
        Ok(rows)
    }

    /// Extracts active pricebook items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extract_pricebook_items(&self) -> Result<Vec<PricebookItem>, DataSourceError> {
        info!("Extracting pricebook items");

        let rows = sqlx::query_as::<_, PricebookItem>(
            r"
            SELECT
                id,
                item_code,
                item_name,
                category,
                current_price::float8 AS current_price,
                supplier_id,
                is_active,
                price_last_updated_at,
                created_at
            FROM pricebook_items
            WHERE is_active = TRUE
            ORDER BY category, item_name
            ",
        )
        .fetch_all(self.pool)
        .await?;

        info!(rows = rows.len(), "Extracted pricebook items");
        Ok(rows)
    }

    /// Extracts price-change history from the last `days_back` days,
    /// most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn extract_price_history(
        &self,
        days_back: i32,
    ) -> Result<Vec<PriceHistoryRecord>, DataSourceError> {
        info!(days_back, "Extracting price history");

        let rows = sqlx::query_as::<_, PriceHistoryRecord>(
            r"
            SELECT
                ph.id,
                ph.pricebook_item_id,
                ph.old_price::float8 AS old_price,
                ph.new_price::float8 AS new_price,
                ph.supplier_id,
                ph.created_at,
                ph.change_reason,
                ph.date_effective,
                pb.item_code,
                pb.item_name,
                pb.category
            FROM price_histories ph
            INNER JOIN pricebook_items pb ON ph.pricebook_item_id = pb.id
            WHERE ph.created_at >= NOW() - ($1::int * INTERVAL '1 day')
            ORDER BY ph.created_at DESC
            ",
        )
        .bind(days_back)
        .fetch_all(self.pool)
        .await?;

        info!(rows = rows.len(), "Extracted price history records");
        Ok(rows)
    }

    /// Fetches the complete purchase history for one item, selected by
    /// code or by id. Used by the single-point anomaly check.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn item_purchase_history(
        &self,
        selector: &ItemSelector,
    ) -> Result<Vec<ItemPurchase>, DataSourceError> {
        let base = r"
            SELECT
                poli.id,
                poli.unit_price::float8 AS unit_price,
                poli.quantity::float8 AS quantity,
                poli.created_at,
                po.supplier_id,
                s.name AS supplier_name,
                pb.item_code,
                pb.item_name
            FROM purchase_order_line_items poli
            INNER JOIN purchase_orders po ON poli.purchase_order_id = po.id
            INNER JOIN pricebook_items pb ON poli.pricebook_item_id = pb.id
            LEFT JOIN suppliers s ON po.supplier_id = s.id
        ";

        let rows = match selector {
            ItemSelector::Code(code) => {
                let query = format!(
                    "{base} WHERE pb.item_code = $1 ORDER BY poli.created_at DESC"
                );
                sqlx::query_as::<_, ItemPurchase>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(code)
                    .fetch_all(self.pool)
                    .await?
            }
            ItemSelector::Id(id) => {
                let query = format!(
                    "{base} WHERE poli.pricebook_item_id = $1 ORDER BY poli.created_at DESC"
                );
                sqlx::query_as::<_, ItemPurchase>(sqlx::AssertSqlSafe(query.as_str()))
                    .bind(id)
                    .fetch_all(self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    /// Extracts every source table needed for one training run.
    ///
    /// # Errors
    ///
    /// Returns an error if any extraction query fails; a partial bundle is
    /// never returned.
    pub async fn extract_all(&self, days_back: i32) -> Result<ExtractedData, DataSourceError> {
        info!("Starting full data extraction");

        let data = ExtractedData {
            po_line_items: self.extract_po_line_items(days_back).await?,
            constructions: self.extract_constructions(days_back).await?,
            suppliers: self.extract_suppliers().await?,
            pricebook_items: self.extract_pricebook_items().await?,
            price_history: self.extract_price_history(days_back).await?,
        };

        info!("Data extraction complete");
        Ok(data)
    }
}
