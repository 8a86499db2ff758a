use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use serde_json::json;
use site_reports::error::AppError;
use site_reports::reports::{
    report_router, sanitize_filename, ReportExporter, ReportService, ReportStore,
};
use std::io::ErrorKind;
use std::sync::Arc;

pub(crate) fn with_report_routes<S>(
    service: Arc<ReportService<S>>,
    exporter: Arc<ReportExporter<S>>,
) -> axum::Router
where
    S: ReportStore + 'static,
{
    report_router(service, exporter)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/exports/:filename",
            axum::routing::get(export_download_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serves a previously exported document from the export directory.
pub(crate) async fn export_download_endpoint(
    Extension(state): Extension<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let name = match sanitize_filename(&filename) {
        Ok(name) => name,
        Err(reason) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
        }
    };

    let path = state.export_dir.join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.to_string())],
                bytes,
            )
                .into_response()
        }
        Err(err) if err.kind() == ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("export {name} not found") })),
        )
            .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
