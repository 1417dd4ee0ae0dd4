//! Feature computation for the procurement ML pipeline.
//!
//! Pure transforms from raw extracted tables into per-entity numeric
//! feature records. Every transform is deterministic for a given input and
//! reference time, and guards every division so no NaN or infinity can
//! reach serialization.

use serde::Serialize;

mod job;
mod price;
mod supplier;

pub use job::{compute_job_features, JobFeatures};
pub use price::{compute_price_features, PriceFeatures};
pub use supplier::{compute_supplier_features, SupplierFeatures};

/// A typed feature record bound to one entity.
///
/// The serialized field set is fixed per implementing type, so every row of
/// one `feature_type` carries the same keys.
pub trait FeatureSet: Serialize {
    /// Discriminator stored in the feature store (e.g. `price_features`).
    const FEATURE_TYPE: &'static str;
    /// Kind of entity the record describes (e.g. `pricebook_item`).
    const ENTITY_TYPE: &'static str;

    /// The entity this record belongs to.
    fn entity_id(&self) -> i64;
}
