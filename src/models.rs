use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use uuid::Uuid;

/// Content fields of a product as read from the store at optimisation time.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: String,
    pub title: String,
    pub description_html: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

/// Generated content that has been through the sanitizer.
///
/// Only `sanitize::sanitize` builds these, so every instance carries a
/// non-empty block-level description, 1-8 tags, a 35-60 char SEO title and
/// a 110-160 char SEO description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedContent {
    pub description_html: String,
    pub tags: Vec<String>,
    pub seo_title: String,
    pub seo_description: String,
}

/// Payload written back to the product store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub description_html: String,
    pub tags: Vec<String>,
    pub seo_title: String,
    pub seo_description: String,
}

impl From<&OptimizedContent> for ProductUpdate {
    fn from(content: &OptimizedContent) -> Self {
        Self {
            description_html: content.description_html.clone(),
            tags: content.tags.clone(),
            seo_title: content.seo_title.clone(),
            seo_description: content.seo_description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Weak,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldHealth {
    pub status: HealthStatus,
    pub message: String,
}

impl FieldHealth {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductHealth {
    pub description: FieldHealth,
    pub tags: FieldHealth,
    pub seo_title: FieldHealth,
    pub seo_description: FieldHealth,
}

impl ProductHealth {
    pub fn needs_optimization(&self) -> bool {
        ![
            &self.description,
            &self.tags,
            &self.seo_title,
            &self.seo_description,
        ]
        .iter()
        .all(|field| field.is_ok())
    }
}

/// One before/after pair persisted per successful optimisation.
///
/// Tags are kept in their serialized (JSON array) form, matching the
/// relational layout the history store was designed around.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecord {
    pub id: Uuid,
    pub shop: String,
    pub product_id: String,
    pub previous_description_html: Option<String>,
    pub previous_tags: String,
    pub previous_seo_title: Option<String>,
    pub previous_seo_description: Option<String>,
    pub optimized_description_html: String,
    pub optimized_tags: String,
    pub optimized_seo_title: String,
    pub optimized_seo_description: String,
    pub created_at: DateTime<Utc>,
}

impl OptimizationRecord {
    pub fn new(shop: &str, previous: &ProductSnapshot, optimized: &OptimizedContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop: shop.to_string(),
            product_id: previous.id.clone(),
            previous_description_html: previous.description_html.clone(),
            previous_tags: serialize_tags(&previous.tags),
            previous_seo_title: previous.seo_title.clone(),
            previous_seo_description: previous.seo_description.clone(),
            optimized_description_html: optimized.description_html.clone(),
            optimized_tags: serialize_tags(&optimized.tags),
            optimized_seo_title: optimized.seo_title.clone(),
            optimized_seo_description: optimized.seo_description.clone(),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds the pre-optimisation field values. Unparseable stored tags
    /// restore as an empty list.
    pub fn previous_update(&self) -> ProductUpdate {
        ProductUpdate {
            description_html: self.previous_description_html.clone().unwrap_or_default(),
            tags: serde_json::from_str(&self.previous_tags).unwrap_or_default(),
            seo_title: self.previous_seo_title.clone().unwrap_or_default(),
            seo_description: self.previous_seo_description.clone().unwrap_or_default(),
        }
    }
}

fn serialize_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Model,
    Fallback,
}

impl ContentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSource::Model => "model",
            ContentSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub product_id: String,
    pub title: String,
    pub health: ProductHealth,
    pub needs_optimization: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub product_id: String,
    pub source: ContentSource,
    pub content: OptimizedContent,
    pub record_id: Uuid,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub product_id: String,
    pub record_id: Uuid,
    pub restored: ProductUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub optimized_count: usize,
    pub failed_count: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub product_id: String,
}

/// Bulk body; `product_ids` stays untyped so a non-array can be reported
/// as a precondition failure instead of a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub product_ids: Value,
}

impl BulkRequest {
    pub fn ids(&self) -> Option<Vec<String>> {
        self.product_ids.as_array().and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(|id| id.trim().to_string()))
                .collect::<Option<Vec<_>>>()
        })
    }
}
