use super::{HistoryStore, ProductStore, StoreError};
use crate::models::{OptimizationRecord, ProductSnapshot, ProductUpdate};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

/// Product store kept in process memory; used for demo mode and tests.
#[derive(Clone, Default)]
pub struct MemoryProductStore {
    products: Arc<Mutex<HashMap<String, ProductSnapshot>>>,
    rejections: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl MemoryProductStore {
    pub fn new(products: impl IntoIterator<Item = ProductSnapshot>) -> Self {
        let map = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            products: Arc::new(Mutex::new(map)),
            rejections: Arc::default(),
        }
    }

    pub fn demo() -> Self {
        Self::new([
            ProductSnapshot {
                id: "demo-1".into(),
                title: "Merino Wool Hiking Socks".into(),
                description_html: Some("<p>Warm socks.</p>".into()),
                tags: vec!["socks".into()],
                seo_title: None,
                seo_description: None,
            },
            ProductSnapshot {
                id: "demo-2".into(),
                title: "Ceramic Pour-Over Coffee Dripper".into(),
                description_html: None,
                tags: vec![],
                seo_title: Some("Coffee Dripper".into()),
                seo_description: None,
            },
            ProductSnapshot {
                id: "demo-3".into(),
                title: "Waxed Canvas Weekender Bag".into(),
                description_html: Some(
                    "<p>Roomy weekender in waxed canvas with leather handles.</p>".into(),
                ),
                tags: vec!["bags".into(), "travel".into()],
                seo_title: None,
                seo_description: Some("Weekender bag".into()),
            },
        ])
    }

    /// Makes every later update of `id` fail with the given validation messages.
    #[cfg(test)]
    pub async fn reject_updates_for(&self, id: &str, messages: &[&str]) {
        self.rejections.lock().await.insert(
            id.to_string(),
            messages.iter().map(|message| message.to_string()).collect(),
        );
    }

    pub async fn get(&self, id: &str) -> Option<ProductSnapshot> {
        self.products.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn fetch_product(&self, id: &str) -> Result<ProductSnapshot, StoreError> {
        self.get(id).await.ok_or(StoreError::NotFound)
    }

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError> {
        if let Some(messages) = self.rejections.lock().await.get(id) {
            return Err(StoreError::Rejected(messages.clone()));
        }
        let mut guard = self.products.lock().await;
        let product = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        product.description_html = optional(&update.description_html);
        product.tags = update.tags.clone();
        product.seo_title = optional(&update.seo_title);
        product.seo_description = optional(&update.seo_description);
        Ok(())
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<Mutex<Vec<OptimizationRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn records_for(&self, shop: &str, product_id: &str) -> Vec<OptimizationRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.shop == shop && record.product_id == product_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append_record(&self, record: &OptimizationRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn most_recent_record(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<Option<OptimizationRecord>, StoreError> {
        // Later appends win ties on created_at.
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.shop == shop && record.product_id == product_id)
            .max_by_key(|record| record.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptimizedContent;

    fn content(title: &str) -> OptimizedContent {
        OptimizedContent {
            description_html: "<p>x</p>".into(),
            tags: vec!["A".into()],
            seo_title: title.into(),
            seo_description: "d".into(),
        }
    }

    #[tokio::test]
    async fn most_recent_record_is_scoped_and_latest() {
        let store = MemoryHistoryStore::new();
        let products = MemoryProductStore::demo();
        let snapshot = products.fetch_product("demo-1").await.unwrap();

        let first = OptimizationRecord::new("shop-a", &snapshot, &content("first"));
        let second = OptimizationRecord::new("shop-a", &snapshot, &content("second"));
        let other_shop = OptimizationRecord::new("shop-b", &snapshot, &content("other"));
        for record in [&first, &second, &other_shop] {
            store.append_record(record).await.unwrap();
        }

        let latest = store
            .most_recent_record("shop-a", "demo-1")
            .await
            .unwrap()
            .expect("record");
        assert_eq!(latest.optimized_seo_title, "second");
        assert!(store.most_recent_record("shop-a", "demo-2").await.unwrap().is_none());
        assert_eq!(store.records_for("shop-a", "demo-1").await.len(), 2);
    }

    #[tokio::test]
    async fn update_maps_empty_fields_to_absent() {
        let store = MemoryProductStore::demo();
        let update = ProductUpdate {
            description_html: String::new(),
            tags: vec![],
            seo_title: "Title".into(),
            seo_description: String::new(),
        };
        store.update_product("demo-1", &update).await.unwrap();
        let product = store.get("demo-1").await.unwrap();
        assert_eq!(product.description_html, None);
        assert_eq!(product.seo_title.as_deref(), Some("Title"));
        assert!(matches!(
            store.update_product("missing", &update).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rejected_updates_leave_product_untouched() {
        let store = MemoryProductStore::demo();
        store.reject_updates_for("demo-2", &["Title is too long"]).await;
        let before = store.get("demo-2").await.unwrap();
        let err = store
            .update_product(
                "demo-2",
                &ProductUpdate {
                    description_html: "<p>x</p>".into(),
                    tags: vec![],
                    seo_title: String::new(),
                    seo_description: String::new(),
                },
            )
            .await
            .expect_err("rejected");
        assert_eq!(err.to_string(), "rejected: Title is too long");
        assert_eq!(store.get("demo-2").await.unwrap(), before);
    }
}
