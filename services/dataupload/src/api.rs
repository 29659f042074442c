use crate::config::ApiConfig;
use crate::error::UploadError;
use crate::models::DataRecord;
use crate::query::query_records;
use crate::store::RecordStore;
use crate::upload::{UploadOutcome, UploadService, UploadedFile};
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub store: Arc<dyn RecordStore>,
    /// Same limit the router enforces, reported back in 413 responses
    pub max_upload_bytes: usize,
}

/// Query parameters for record listing
#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    /// Filter by record type tag
    #[serde(rename = "type")]
    pub record_type: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/data/upload/", post(upload_file))
        .route("/data/query/", get(query_data))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "dataupload-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            warn!(error = ?e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "database": "disconnected"
                })),
            )
        }
    }
}

/// Accept one multipart `file` field and store its records
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadOutcome>, UploadError> {
    let result = match multipart {
        Ok(multipart) => match read_file_field(multipart, state.max_upload_bytes).await {
            Ok(file) => state.uploads.handle(file).await,
            Err(e) => Err(e),
        },
        Err(rejection) => Err(UploadError::InvalidMultipart(rejection.body_text())),
    };

    match &result {
        Ok(_) => metrics::counter!("dataupload.uploads.accepted").increment(1),
        Err(e) => metrics::counter!("dataupload.uploads.rejected", "code" => e.code()).increment(1),
    }

    result.map(Json)
}

/// Pull the `file` field out of the form; other fields are ignored
async fn read_file_field(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<UploadedFile, UploadError> {
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::FileTooLarge(max_upload_bytes)
        } else {
            UploadError::InvalidMultipart(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let contents = field.bytes().await.map_err(read_error)?;

        if file_name.is_empty() {
            return Err(UploadError::MissingFile);
        }

        return Ok(UploadedFile {
            file_name,
            content_type,
            contents,
        });
    }

    Err(UploadError::MissingFile)
}

/// List stored records, optionally by `?type=`
#[instrument(skip(state))]
async fn query_data(
    State(state): State<AppState>,
    Query(params): Query<RecordListQuery>,
) -> Result<Json<Vec<DataRecord>>, UploadError> {
    let records = query_records(state.store.as_ref(), params.record_type.as_deref()).await?;
    Ok(Json(records))
}

/// Serve the API until `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting data upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
