// src/api.rs
//! REST surface over the pipeline. Handlers are thin: every figure comes from
//! the library, the router only maps results onto status codes.

use std::io;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::{PipelineError, SourceFailure};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::providers::{build_source, build_sources, KNOWN_IDS};
use crate::ingest::render::PageRenderer;
use crate::ingest::{self, types::PriceSource};
use crate::metrics::Metrics;
use crate::report::{self, ReportStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub store: ReportStore,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Self {
        let store = ReportStore::new(config.reports.dir.clone());
        Self {
            config: Arc::new(config),
            fetcher,
            renderer,
            store,
        }
    }

    fn sources(&self) -> Vec<Arc<dyn PriceSource>> {
        build_sources(&self.config, self.fetcher.clone(), self.renderer.clone())
    }
}

pub fn create_router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/fetch/all", get(fetch_all))
        .route("/api/fetch/{source}", get(fetch_one))
        .route("/api/reports", post(create_report).get(list_reports))
        .route("/api/reports/{name}", get(get_report))
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// JSON error body with a status code: `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    extra: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: None,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::PreconditionViolation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Io(io) if io.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            // Two reports created within the same second share a name.
            PipelineError::Io(io) if io.kind() == io::ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl From<SourceFailure> for ApiError {
    fn from(e: SourceFailure) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
            extra: Some(json!({ "source": e.source_id(), "kind": e.kind() })),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "error": self.message });
        if let (Some(obj), Some(Value::Object(extra))) = (body.as_object_mut(), self.extra) {
            obj.extend(extra);
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now().to_rfc3339() }))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "config": state.config.as_ref() }))
}

/// Collect, derive and assemble without persisting.
async fn fetch_all(State(state): State<AppState>) -> ApiResult {
    let doc = report::generate(&state.sources(), &state.config).await?;
    Ok(Json(json!({ "success": true, "report": doc })))
}

async fn fetch_one(State(state): State<AppState>, Path(source): Path<String>) -> ApiResult {
    if !KNOWN_IDS.contains(&source.as_str()) {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("unknown source {source:?}"),
        ));
    }
    let src = build_source(
        &source,
        &state.config,
        state.fetcher.clone(),
        state.renderer.clone(),
    )
    .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown source {source:?}")))?;
    let quote = ingest::collect_one(src, state.config.fetch.source_deadline()).await?;
    Ok(Json(json!({ "success": true, "quote": quote })))
}

async fn create_report(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let doc = report::generate(&state.sources(), &state.config).await?;
    let path = state.store.persist(&doc)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "name": name, "report": doc })),
    ))
}

async fn list_reports(State(state): State<AppState>) -> ApiResult {
    let reports = state.store.list(state.config.reports.list_limit)?;
    Ok(Json(json!({ "success": true, "reports": reports })))
}

async fn get_report(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let doc = state.store.load(&name)?;
    Ok(Json(json!({ "success": true, "report": doc })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: PipelineError) -> StatusCode {
        ApiError::from(e).status
    }

    #[test]
    fn pipeline_errors_map_to_status_codes() {
        assert_eq!(
            status_of(PipelineError::Io(io::Error::from(io::ErrorKind::AlreadyExists))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PipelineError::Io(io::Error::from(io::ErrorKind::NotFound))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::PreconditionViolation("bad name".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PipelineError::config("broken")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
