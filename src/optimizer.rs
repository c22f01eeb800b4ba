use crate::generator::{ContentGenerator, Generated};
use crate::models::{
    AuditReport, BatchSummary, OptimizationRecord, OptimizationReport, ProductSnapshot,
    ProductUpdate, RollbackReport, StageReport,
};
use crate::store::{HistoryStore, ProductStore, StoreError};
use crate::validator::product_health;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use std::{collections::HashSet, future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs fetch → generate → apply → record for one or many products.
///
/// History is appended only after the store accepted the update, so a failed
/// attempt never leaves a rollback point for content that was not applied.
#[derive(Clone)]
pub struct Optimizer {
    shop: String,
    products: Arc<dyn ProductStore>,
    history: Arc<dyn HistoryStore>,
    generator: Arc<ContentGenerator>,
    concurrency: usize,
}

impl Optimizer {
    pub fn new(
        shop: impl Into<String>,
        products: Arc<dyn ProductStore>,
        history: Arc<dyn HistoryStore>,
        generator: ContentGenerator,
    ) -> Self {
        Self {
            shop: shop.into(),
            products,
            history,
            generator: Arc::new(generator),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn shop(&self) -> &str {
        &self.shop
    }

    pub async fn audit(&self, product_id: &str) -> Result<AuditReport, OptimizeError> {
        let snapshot = self.fetch("audit", product_id).await?;
        let health = product_health(&snapshot);
        Ok(AuditReport {
            product_id: snapshot.id,
            title: snapshot.title,
            needs_optimization: health.needs_optimization(),
            health,
        })
    }

    pub async fn optimize_one(&self, product_id: &str) -> Result<OptimizationReport, OptimizeError> {
        let mut stages = Vec::new();

        let snapshot = self
            .capture_stage("fetch_product", &mut stages, async {
                let snapshot = self.fetch("fetch_product", product_id).await?;
                let health = product_health(&snapshot);
                let output = json!({
                    "title": snapshot.title,
                    "needs_optimization": health.needs_optimization(),
                    "health": health,
                });
                Ok(StageOutcome::new(snapshot, output))
            })
            .await?;

        let generated = self
            .capture_stage("generate_content", &mut stages, async {
                let generated = self.generator.generate(&snapshot).await;
                let output = json!({
                    "source": generated.source,
                    "tag_count": generated.content.tags.len(),
                    "seo_title_length": generated.content.seo_title.chars().count(),
                    "seo_description_length": generated.content.seo_description.chars().count(),
                });
                Ok(StageOutcome::new(generated, output))
            })
            .await?;

        self.capture_stage("apply_update", &mut stages, async {
            let update = ProductUpdate::from(&generated.content);
            self.products
                .update_product(&snapshot.id, &update)
                .await
                .map_err(|err| OptimizeError::from_store("apply_update", err))?;
            Ok(StageOutcome::new((), json!({ "product_id": snapshot.id })))
        })
        .await?;

        let record = self
            .capture_stage("record_history", &mut stages, async {
                self.record(&snapshot, &generated).await
            })
            .await?;

        info!(
            target = "optimizer.pipeline",
            shop = %self.shop,
            product_id = %snapshot.id,
            source = generated.source.as_str(),
            record_id = %record.id,
            "product_optimized"
        );

        Ok(OptimizationReport {
            product_id: snapshot.id,
            source: generated.source,
            content: generated.content,
            record_id: record.id,
            stages,
        })
    }

    /// Optimizes every id independently; per-item failures are counted,
    /// never propagated. Repeated ids are processed once.
    ///
    /// Each item runs on its own task: dropping the returned future stops
    /// new items from starting, but an item already in flight still reaches
    /// `record_history` and logs its outcome.
    pub async fn optimize_many(&self, product_ids: &[String]) -> Result<BatchSummary, OptimizeError> {
        if product_ids.is_empty() {
            return Err(OptimizeError::precondition_failed(
                "optimize_many",
                "no products selected",
            ));
        }

        let unique: Vec<String> = {
            let mut seen = HashSet::new();
            product_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect()
        };

        let this = self.clone();
        let outcomes: Vec<bool> = stream::iter(unique)
            .map(move |id| {
                let this = this.clone();
                async move {
                    tokio::spawn(async move { this.optimize_item(id).await })
                        .await
                        .unwrap_or_else(|err| {
                            warn!(
                                target = "optimizer.pipeline",
                                error = %err,
                                "bulk_item_task_aborted"
                            );
                            false
                        })
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let optimized_count = outcomes.iter().filter(|ok| **ok).count();
        let failed_count = outcomes.len() - optimized_count;

        let message = if failed_count == 0 {
            format!("Optimized {}.", products(optimized_count))
        } else {
            format!(
                "Optimized {}; {} failed.",
                products(optimized_count),
                failed_count
            )
        };
        info!(
            target = "optimizer.pipeline",
            shop = %self.shop,
            optimized = optimized_count,
            failed = failed_count,
            "bulk_optimization_finished"
        );

        Ok(BatchSummary {
            optimized_count,
            failed_count,
            message,
        })
    }

    /// Restores the fields captured before the most recent optimisation.
    /// Does not append history, so repeating it restores the same state.
    pub async fn rollback(&self, product_id: &str) -> Result<RollbackReport, OptimizeError> {
        let record = self
            .history
            .most_recent_record(&self.shop, product_id)
            .await
            .map_err(|err| OptimizeError::from_store("load_history", err))?
            .ok_or_else(|| {
                OptimizeError::no_history(
                    "load_history",
                    format!("no optimization history for {product_id}"),
                )
            })?;

        let restored = record.previous_update();
        self.products
            .update_product(product_id, &restored)
            .await
            .map_err(|err| OptimizeError::from_store("restore_product", err))?;

        info!(
            target = "optimizer.pipeline",
            shop = %self.shop,
            product_id = %product_id,
            record_id = %record.id,
            "product_rolled_back"
        );

        Ok(RollbackReport {
            product_id: product_id.to_string(),
            record_id: record.id,
            restored,
        })
    }

    async fn optimize_item(&self, product_id: String) -> bool {
        match self.optimize_one(&product_id).await {
            Ok(_) => {
                crate::metrics::product_outcome("optimized");
                true
            }
            Err(err) => {
                crate::metrics::product_outcome("failed");
                warn!(
                    target = "optimizer.pipeline",
                    shop = %self.shop,
                    product_id = %product_id,
                    stage = err.stage(),
                    error = %err.detail(),
                    "bulk_item_failed"
                );
                false
            }
        }
    }

    async fn fetch(
        &self,
        stage: &'static str,
        product_id: &str,
    ) -> Result<ProductSnapshot, OptimizeError> {
        if product_id.trim().is_empty() {
            return Err(OptimizeError::precondition_failed(stage, "empty product id"));
        }
        self.products
            .fetch_product(product_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => {
                    OptimizeError::not_found(stage, format!("product {product_id} not found"))
                }
                other => OptimizeError::from_store(stage, other),
            })
    }

    async fn record(
        &self,
        snapshot: &ProductSnapshot,
        generated: &Generated,
    ) -> Result<StageOutcome<OptimizationRecord>, OptimizeError> {
        let record = OptimizationRecord::new(&self.shop, snapshot, &generated.content);
        if let Err(err) = self.history.append_record(&record).await {
            warn!(
                target = "optimizer.store",
                product_id = %snapshot.id,
                error = %err,
                "history_append_failed_after_apply"
            );
            return Err(OptimizeError::upstream(
                "record_history",
                format!("product was updated but no rollback point was recorded: {err}"),
            ));
        }
        let output = json!({ "record_id": record.id, "created_at": record.created_at });
        Ok(StageOutcome::new(record, output))
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, OptimizeError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, OptimizeError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

fn products(count: usize) -> String {
    if count == 1 {
        "1 product".to_string()
    } else {
        format!("{count} products")
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct OptimizeError {
    stage: &'static str,
    message: String,
    kind: OptimizeErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeErrorKind {
    NotFound,
    NoHistory,
    Upstream,
    ValidationRejected,
    PreconditionFailed,
}

impl OptimizeError {
    fn new(stage: &'static str, message: impl Into<String>, kind: OptimizeErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, OptimizeErrorKind::NotFound)
    }

    pub fn no_history(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, OptimizeErrorKind::NoHistory)
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, OptimizeErrorKind::Upstream)
    }

    pub fn rejected(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, OptimizeErrorKind::ValidationRejected)
    }

    pub fn precondition_failed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, OptimizeErrorKind::PreconditionFailed)
    }

    pub fn from_store(stage: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found(stage, "not found"),
            StoreError::Upstream(message) => Self::upstream(stage, message),
            StoreError::Rejected(messages) => Self::rejected(stage, messages.join("; ")),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> OptimizeErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
