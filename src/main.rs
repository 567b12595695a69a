mod archive;
mod config;
mod http;
mod imaging;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod security;
mod shopify;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::AppConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiResponse, CreateListingRequest, ImagesRequest, ShopifyProductSummary};
use pipeline::{BatchOutcome, BatchState, Pipeline};
use security::{AuthState, require_shared_secret};
use serde_json::json;
use std::{any::Any, net::SocketAddr, path::Path};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "snaplist.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(config::parse_env_bool("DEBUG_MODE"));
    let config = AppConfig::from_env();

    let pipeline = Pipeline::from_env(config.pipeline.clone());
    let publishing = pipeline.publishing_enabled();
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let state = AppState {
        pipeline,
        prometheus_handle,
        metrics_key: config.metrics_key.clone(),
    };
    let auth = AuthState::new(config.auth_password.clone());
    let app = build_router(state, auth, config.body_limit, config.static_dir.as_deref());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(
        target = "snaplist.api",
        body_limit = config.body_limit,
        max_images = config.pipeline.max_images,
        publishing,
        debug_mode = config.debug_mode,
        "listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    prometheus_handle: PrometheusHandle,
    metrics_key: Option<String>,
}

fn build_router(
    state: AppState,
    auth: AuthState,
    body_limit: usize,
    static_dir: Option<&Path>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_origin(AnyOrigin);

    let listing_routes = Router::new()
        .route("/generate-metadata", post(generate_metadata))
        .route("/create-listing", post(create_listing))
        .route("/upload-and-next", post(upload_and_next))
        .route_layer(middleware::from_fn_with_state(auth, require_shared_secret));

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(listing_routes);
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "snaplist-api-rs",
    }))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Crop the uploaded photos and ask the oracle for listing metadata.
///
/// - Method: `POST`
/// - Path: `/generate-metadata`
/// - Body: `{images: [encoded, ...]}`
/// - Response: `{success, metadata, cropped_images}` or `{success:false, message}`
async fn generate_metadata(
    State(state): State<AppState>,
    payload: Result<Json<ImagesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AppError> {
    crate::metrics::inc_requests("/generate-metadata");
    let Json(payload) = payload?;
    let outcome = state.pipeline.generate_metadata(payload.images).await;
    if !outcome.succeeded() {
        return Ok(Json(failure(&outcome, "Error generating metadata")));
    }
    Ok(Json(ApiResponse {
        success: true,
        metadata: outcome.metadata,
        cropped_images: Some(outcome.cropped_images),
        ..Default::default()
    }))
}

/// Publish metadata the client has reviewed, with its photos.
///
/// - Method: `POST`
/// - Path: `/create-listing`
/// - Body: `{images: [...], metadata: {...}}`
async fn create_listing(
    State(state): State<AppState>,
    payload: Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AppError> {
    crate::metrics::inc_requests("/create-listing");
    let Json(payload) = payload?;
    let Some(metadata) = payload.metadata else {
        return Ok(Json(ApiResponse::failure("Missing images or metadata")));
    };
    if payload.images.is_empty() {
        return Ok(Json(ApiResponse::failure("Missing images or metadata")));
    }
    let outcome = state
        .pipeline
        .create_listing(payload.images, metadata.into())
        .await;
    if !outcome.succeeded() {
        return Ok(Json(failure(&outcome, "Error creating listing")));
    }
    Ok(Json(ApiResponse {
        batch_id: Some(outcome.batch_id.to_string()),
        shopify_product: outcome.listing.as_ref().map(ShopifyProductSummary::from),
        stages: Some(outcome.stages.clone()),
        ..ApiResponse::ok("Listing created successfully")
    }))
}

/// Single-call flow: crop, describe and publish in one request.
///
/// - Method: `POST`
/// - Path: `/upload-and-next`
/// - Body: `{images: [...]}`
/// - Response: `{success, message, batch_id, shopify_product, stages}`
async fn upload_and_next(
    State(state): State<AppState>,
    payload: Result<Json<ImagesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AppError> {
    crate::metrics::inc_requests("/upload-and-next");
    let Json(payload) = payload?;
    let outcome = state.pipeline.upload_and_publish(payload.images).await;
    if !outcome.succeeded() {
        return Ok(Json(failure(&outcome, "Error processing upload")));
    }
    Ok(Json(ApiResponse {
        batch_id: Some(outcome.batch_id.to_string()),
        metadata: outcome.metadata.clone(),
        shopify_product: outcome.listing.as_ref().map(ShopifyProductSummary::from),
        stages: Some(outcome.stages.clone()),
        ..ApiResponse::ok(format!(
            "{} images uploaded to batch {}",
            outcome.image_count, outcome.batch_id
        ))
    }))
}

/// Batch-shape problems are reported verbatim; everything else gets the route's prefix.
fn failure(outcome: &BatchOutcome, prefix: &str) -> ApiResponse {
    let message = match &outcome.state {
        BatchState::Failed { stage, reason } if stage == "receive_batch" => reason.clone(),
        BatchState::Failed { reason, .. } => format!("{prefix}: {reason}"),
        other => format!("{prefix}: unexpected state {other:?}"),
    };
    ApiResponse {
        batch_id: Some(outcome.batch_id.as_str().to_owned()),
        ..ApiResponse::failure(message)
    }
}

#[derive(Debug)]
enum AppError {
    PayloadTooLarge,
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "File too large".to_string()),
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
        };
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(target = "snaplist.api", detail, "handler_panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::failure("Internal server error")),
    )
        .into_response()
}

fn init_tracing(debug_mode: bool) {
    let fallback = if debug_mode {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt().with_env_filter(filter).try_init();
}
