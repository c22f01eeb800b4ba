mod config;
mod generator;
mod http;
mod jobs;
mod llm;
mod metrics;
mod models;
mod optimizer;
mod sanitize;
mod security;
mod store;
mod validator;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Path, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::AppConfig;
use generator::ContentGenerator;
use llm::LlmClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, AuditReport, BatchSummary, BulkRequest, OptimizationReport, ProductRequest,
    RollbackReport,
};
use optimizer::{OptimizeError, OptimizeErrorKind, Optimizer};
use security::{AuthContext, AuthState, require_api_auth};
use serde::Serialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use store::{
    HistoryStore, MemoryHistoryStore, MemoryProductStore, ProductStore, RedisHistoryStore,
    ShopifyProductStore,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    if let Err(err) = run().await {
        error!(target = "optimizer.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let config = AppConfig::from_env();

    let products: Arc<dyn ProductStore> = match config.shopify.clone() {
        Some(shopify) => {
            info!(
                target = "optimizer.store",
                shop = %shopify.shop_domain,
                "using Shopify product store"
            );
            Arc::new(ShopifyProductStore::new(shopify))
        }
        None => {
            warn!(
                target = "optimizer.store",
                "SHOPIFY_ADMIN_TOKEN not set; serving in-memory demo products"
            );
            Arc::new(MemoryProductStore::demo())
        }
    };
    let history: Arc<dyn HistoryStore> = match config.redis_url.as_deref() {
        Some(url) => {
            info!(target = "optimizer.store", "using Redis history store");
            Arc::new(RedisHistoryStore::open(url)?)
        }
        None => {
            warn!(
                target = "optimizer.store",
                "REDIS_URL not set; optimisation history is kept in memory"
            );
            Arc::new(MemoryHistoryStore::new())
        }
    };
    if config.llm.api_key.is_none() {
        warn!(
            target = "optimizer.llm",
            "OPENAI_API_KEY not set; every product will use fallback content"
        );
    }

    let generator = ContentGenerator::new(LlmClient::new(config.llm.clone()));
    let optimizer = Optimizer::new(config.shop.clone(), products, history, generator)
        .with_concurrency(config.concurrency);
    let (queue, _worker) = jobs::JobQueue::spawn(
        optimizer.clone(),
        config.queue_capacity,
        config.job_retention,
    );
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        optimizer,
        queue,
        prometheus_handle,
    };
    let auth = AuthState::from_key_list(config.api_keys.as_deref());
    let app = build_router(state, auth, config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "optimizer.api", shop = %config.shop, "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    optimizer: Optimizer,
    queue: jobs::JobQueue,
    prometheus_handle: PrometheusHandle,
}

fn build_router(state: AppState, auth: AuthState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .nest(
            "/products",
            Router::new()
                .route("/audit", post(audit_product))
                .route("/optimize", post(optimize_product))
                .route("/optimize/bulk", post(optimize_bulk))
                .route("/rollback", post(rollback_product)),
        )
        .nest(
            "/jobs",
            Router::new()
                .route("/optimize", post(enqueue_bulk_job))
                .route("/{id}", get(get_job_status)),
        )
        .route_layer(middleware::from_fn_with_state(auth, require_api_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "listing-optimizer",
        "shop": state.optimizer.shop(),
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Report how each content field scores against the listing guidelines.
///
/// - Method: `POST`
/// - Path: `/products/audit`
/// - Body: `{ "product_id": "..." }`
async fn audit_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<AuditReport>, AppError> {
    crate::metrics::inc_requests("/products/audit");
    Ok(Json(state.optimizer.audit(&payload.product_id).await?))
}

/// Generate, apply and record new content for one product.
///
/// - Method: `POST`
/// - Path: `/products/optimize`
/// - Auth: `Authorization: Bearer <key>` or `X-Optimizer-Key: <key>`
/// - Response: `OptimizationReport` (applied content, source and per-stage transcript)
async fn optimize_product(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<OptimizationReport>, AppError> {
    crate::metrics::inc_requests("/products/optimize");
    info!(
        target = "optimizer.api",
        caller = %context.label,
        api_key = %context.key_id,
        product_id = %payload.product_id,
        "optimize invoked"
    );
    Ok(Json(state.optimizer.optimize_one(&payload.product_id).await?))
}

/// Optimize a list of products and wait for the summary.
///
/// Items already started keep running if the client disconnects; items not
/// yet started are skipped. Large batches belong on `POST /jobs/optimize`.
async fn optimize_bulk(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<BulkRequest>,
) -> Result<Json<BatchSummary>, AppError> {
    crate::metrics::inc_requests("/products/optimize/bulk");
    let ids = bulk_ids(&payload)?;
    info!(
        target = "optimizer.api",
        caller = %context.label,
        products = ids.len(),
        "bulk optimize invoked"
    );
    Ok(Json(state.optimizer.optimize_many(&ids).await?))
}

async fn rollback_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<RollbackReport>, AppError> {
    crate::metrics::inc_requests("/products/rollback");
    Ok(Json(state.optimizer.rollback(&payload.product_id).await?))
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_bulk_job(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<BulkRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    crate::metrics::inc_requests("/jobs/optimize");
    let ids = bulk_ids(&payload)?;
    let id = state
        .queue
        .enqueue_bulk(ids, context)
        .await
        .map_err(AppError::Queue)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            job_id: id.to_string(),
        }),
    ))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(OptimizeError::precondition_failed("jobs", "invalid job id").into());
    };
    match state.queue.get(uuid).await {
        Some(info) => Ok(Json(info)),
        None => Err(OptimizeError::not_found("jobs", format!("job {id} not found")).into()),
    }
}

/// Rejects anything but a non-empty array of strings before any store is touched.
fn bulk_ids(payload: &BulkRequest) -> Result<Vec<String>, AppError> {
    match payload.ids() {
        Some(ids) if !ids.is_empty() => Ok(ids),
        _ => Err(OptimizeError::precondition_failed(
            "optimize_many",
            "product_ids must be a non-empty array of strings",
        )
        .into()),
    }
}

#[derive(Debug)]
enum AppError {
    Optimize(OptimizeError),
    Queue(ApiError),
}

impl From<OptimizeError> for AppError {
    fn from(value: OptimizeError) -> Self {
        Self::Optimize(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Optimize(err) => {
                let (status, code) = match err.kind() {
                    OptimizeErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    OptimizeErrorKind::NoHistory => (StatusCode::NOT_FOUND, "no_history"),
                    OptimizeErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream_error"),
                    OptimizeErrorKind::ValidationRejected => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "validation_rejected")
                    }
                    OptimizeErrorKind::PreconditionFailed => {
                        (StatusCode::BAD_REQUEST, "precondition_failed")
                    }
                };
                let payload = ApiError {
                    error: code.to_string(),
                    detail: Some(format!("{}: {}", err.stage(), err.detail())),
                };
                (status, Json(payload)).into_response()
            }
            AppError::Queue(payload) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
