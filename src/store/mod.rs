pub mod memory;
pub mod redis;
pub mod shopify;

use crate::models::{OptimizationRecord, ProductSnapshot, ProductUpdate};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::{MemoryHistoryStore, MemoryProductStore};
pub use self::redis::RedisHistoryStore;
pub use shopify::{ShopifyConfig, ShopifyProductStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn fetch_product(&self, id: &str) -> Result<ProductSnapshot, StoreError>;

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError>;
}

/// Append-only version log keyed by `(shop, product_id)`.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_record(&self, record: &OptimizationRecord) -> Result<(), StoreError>;

    async fn most_recent_record(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<Option<OptimizationRecord>, StoreError>;
}
