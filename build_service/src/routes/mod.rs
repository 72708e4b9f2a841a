//! Build service HTTP routes.

pub mod api;

use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::BuildError;
use crate::models::build::{Build, SubmitBuild};
use crate::services::build_service::BuildService;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct RouterState {
    pub service: BuildService,
    pub max_list_limit: usize,
}

/// Build API routes (nested at `/api/v1`).
fn api_routes() -> Router<RouterState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/builds", get(list_builds_handler).post(create_build_handler))
        .route("/builds/{id}", get(get_build_handler))
}

/// Full application: API, metrics exposition, tracing, and request timeout.
pub fn app(state: RouterState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

// ── Health ──

async fn health_handler(State(state): State<RouterState>) -> Response {
    let report = state.service.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(api::HealthJson::from(&report))).into_response()
}

// ── Build API ──

async fn create_build_handler(
    State(state): State<RouterState>,
    body: Result<Json<SubmitBuild>, JsonRejection>,
) -> Result<(StatusCode, Json<Build>), BuildError> {
    let Json(req) = body.map_err(|e| {
        tracing::debug!("Rejected build body: {e}");
        BuildError::Validation("Invalid request body".to_string())
    })?;

    let build = state.service.submit(req).await?;
    Ok((StatusCode::CREATED, Json(build)))
}

async fn list_builds_handler(
    State(state): State<RouterState>,
    query: Result<Query<api::ListBuildsQuery>, QueryRejection>,
) -> Result<Json<Vec<Build>>, BuildError> {
    let Query(query) = query.map_err(|e| {
        tracing::debug!("Rejected list query: {e}");
        BuildError::Validation("Invalid limit".to_string())
    })?;
    let limit = query.effective_limit(state.max_list_limit);
    state.service.list_builds(limit).await.map(Json)
}

async fn get_build_handler(
    State(state): State<RouterState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Build>, BuildError> {
    let Path(id) = id.map_err(|_| BuildError::Validation("Invalid build ID".to_string()))?;
    state.service.get_build(id).await.map(Json)
}

// ── Metrics ──

async fn metrics_handler(State(state): State<RouterState>) -> Response {
    match state.service.metrics().render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
