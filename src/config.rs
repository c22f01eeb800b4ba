use crate::llm::LlmConfig;
use crate::llm::chat::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::optimizer::DEFAULT_CONCURRENCY;
use crate::store::ShopifyConfig;
use std::{env, str::FromStr, time::Duration};

const DEFAULT_SHOP: &str = "demo-shop";
const DEFAULT_API_VERSION: &str = "2024-10";

/// Process settings, read once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub shop: String,
    pub shopify: Option<ShopifyConfig>,
    pub redis_url: Option<String>,
    pub llm: LlmConfig,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub job_retention: usize,
    pub body_limit: usize,
    pub api_keys: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let positive = |key: &str, default: u64| {
            parsed::<u64>(text(key)).filter(|v| *v > 0).unwrap_or(default)
        };

        let shop = text("SHOP_DOMAIN").unwrap_or_else(|| DEFAULT_SHOP.to_string());
        let http_timeout = Duration::from_secs(positive("HTTP_TIMEOUT_SECS", 15));
        let connect_timeout = Duration::from_secs(positive("HTTP_CONNECT_TIMEOUT_SECS", 5));

        let shopify = text("SHOPIFY_ADMIN_TOKEN").map(|access_token| ShopifyConfig {
            shop_domain: shop.clone(),
            access_token,
            api_version: text("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: http_timeout,
            connect_timeout,
        });

        let llm = LlmConfig {
            base_url: text("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: text("OPENAI_API_KEY"),
            model: text("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(positive("LLM_TIMEOUT_SECS", 20)),
            connect_timeout,
        };

        Self {
            port: parsed(text("PORT")).unwrap_or(8000),
            shop,
            shopify,
            redis_url: text("REDIS_URL"),
            llm,
            concurrency: positive("OPTIMIZE_CONCURRENCY", DEFAULT_CONCURRENCY as u64) as usize,
            queue_capacity: positive("QUEUE_CAPACITY", 64) as usize,
            job_retention: positive("JOB_RETENTION", 1000) as usize,
            body_limit: positive("REQUEST_MAX_BYTES", 256 * 1024) as usize,
            api_keys: text("OPTIMIZER_API_KEYS"),
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|raw| raw.parse().ok())
}
