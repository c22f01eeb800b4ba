use super::{HistoryStore, StoreError};
use crate::models::OptimizationRecord;
use ::redis::AsyncCommands;
use async_trait::async_trait;

const KEY_PREFIX: &str = "optimizer:history";

/// History kept as one Redis list per product, newest record at the head.
#[derive(Clone)]
pub struct RedisHistoryStore {
    client: ::redis::Client,
}

impl RedisHistoryStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client =
            ::redis::Client::open(url).map_err(|err| StoreError::Upstream(err.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| StoreError::Upstream(err.to_string()))
    }
}

fn history_key(shop: &str, product_id: &str) -> String {
    format!("{KEY_PREFIX}:{shop}:{product_id}")
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append_record(&self, record: &OptimizationRecord) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(record).map_err(|err| StoreError::Upstream(err.to_string()))?;
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .lpush(history_key(&record.shop, &record.product_id), json)
            .await
            .map_err(|err| StoreError::Upstream(err.to_string()))?;
        Ok(())
    }

    async fn most_recent_record(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<Option<OptimizationRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .lindex(history_key(shop, product_id), 0)
            .await
            .map_err(|err| StoreError::Upstream(err.to_string()))?;
        raw.map(|value| {
            serde_json::from_str(&value).map_err(|err| StoreError::Upstream(err.to_string()))
        })
        .transpose()
    }
}
