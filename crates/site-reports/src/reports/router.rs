use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use super::builder::ReportDraft;
use super::domain::{ProjectId, ReportId, ReportPatch};
use super::export::{EmailOptions, ExportChannelError, ExportError, ReportExporter};
use super::schema::{self, SchemaError};
use super::service::{ReportService, ReportServiceError};
use super::store::ReportStore;

/// Shared handler state.
pub struct ReportApi<S> {
    service: Arc<ReportService<S>>,
    exporter: Arc<ReportExporter<S>>,
}

impl<S> Clone for ReportApi<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            exporter: Arc::clone(&self.exporter),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileExportRequest {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailExportRequest {
    address: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Router builder exposing report CRUD, schema lookup, and export endpoints.
pub fn report_router<S>(
    service: Arc<ReportService<S>>,
    exporter: Arc<ReportExporter<S>>,
) -> Router
where
    S: ReportStore + 'static,
{
    Router::new()
        .route("/api/v1/report-types", get(report_types_handler))
        .route("/api/v1/report-types/:tag/schema", get(schema_handler))
        .route("/api/v1/reports", post(create_handler::<S>))
        .route(
            "/api/v1/projects/:project_id/reports",
            get(list_handler::<S>),
        )
        .route(
            "/api/v1/reports/:report_id",
            get(get_handler::<S>)
                .patch(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .route(
            "/api/v1/reports/:report_id/export/file",
            post(export_file_handler::<S>),
        )
        .route(
            "/api/v1/reports/:report_id/export/email",
            post(export_email_handler::<S>),
        )
        .route(
            "/api/v1/reports/:report_id/export/print",
            post(export_print_handler::<S>),
        )
        .with_state(ReportApi { service, exporter })
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

pub(crate) fn service_error_response(error: ReportServiceError) -> Response {
    match error {
        ReportServiceError::Validation(fields) => {
            let payload = json!({
                "error": format!("invalid report content: {fields}"),
                "fields": fields,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ReportServiceError::InvalidVariant(reason) => error_body(StatusCode::BAD_REQUEST, reason),
        ReportServiceError::NotFound(id) => {
            error_body(StatusCode::NOT_FOUND, format!("report {id} not found"))
        }
        ReportServiceError::Conflict(id) => {
            error_body(StatusCode::CONFLICT, format!("report {id} already exists"))
        }
        ReportServiceError::Unauthenticated => {
            error_body(StatusCode::UNAUTHORIZED, ReportServiceError::Unauthenticated.to_string())
        }
        ReportServiceError::Artifacts(err) => error_body(StatusCode::BAD_GATEWAY, err.to_string()),
        other @ ReportServiceError::Persistence { .. } => {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

pub(crate) fn export_error_response(error: ExportError) -> Response {
    match error {
        ExportError::Store(err) => service_error_response(err.into()),
        ExportError::Render(err) => error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        ExportError::Channel(err) => {
            let status = match err {
                ExportChannelError::Rejected { .. } => StatusCode::BAD_REQUEST,
                ExportChannelError::Timeout { .. } | ExportChannelError::Failed { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            };
            let payload = json!({
                "error": err.to_string(),
                "channel": err.channel(),
                "timed_out": matches!(err, ExportChannelError::Timeout { .. }),
            });
            (status, axum::Json(payload)).into_response()
        }
    }
}

async fn report_types_handler() -> Response {
    let types: Vec<_> = schema::schemas()
        .into_iter()
        .map(|variant| {
            json!({
                "tag": variant.report_type.tag(),
                "label": variant.label,
                "required_fields": variant.required_fields().map(|f| f.name).collect::<Vec<_>>(),
                "optional_fields": variant.optional_fields().map(|f| f.name).collect::<Vec<_>>(),
            })
        })
        .collect();
    (StatusCode::OK, axum::Json(json!({ "report_types": types }))).into_response()
}

async fn schema_handler(Path(tag): Path<String>) -> Response {
    match schema::schema_for_tag(&tag) {
        Ok(variant) => (StatusCode::OK, axum::Json(variant)).into_response(),
        Err(SchemaError::InvalidVariant(tag)) => error_body(
            StatusCode::BAD_REQUEST,
            format!("unknown report type '{tag}'"),
        ),
        Err(other) => error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

async fn create_handler<S>(
    State(api): State<ReportApi<S>>,
    axum::Json(draft): axum::Json<ReportDraft>,
) -> Response
where
    S: ReportStore + 'static,
{
    match api.service.create(draft).await {
        Ok(created) => {
            let warnings: Vec<_> = created
                .warnings
                .iter()
                .map(|warning| json!({ "detail": warning, "message": warning.message() }))
                .collect();
            let payload = json!({
                "report": created.report.view(),
                "warnings": warnings,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

async fn list_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(project_id): Path<String>,
) -> Response
where
    S: ReportStore + 'static,
{
    let project_id = ProjectId::new(project_id);
    match api.service.list_by_project(&project_id).await {
        Ok(reports) => {
            let views: Vec<_> = reports.iter().map(|report| report.view()).collect();
            let payload = json!({
                "project_id": project_id,
                "reports": views,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

async fn get_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + 'static,
{
    match api.service.get(&ReportId::new(report_id)).await {
        Ok(report) => (StatusCode::OK, axum::Json(report.view())).into_response(),
        Err(error) => service_error_response(error),
    }
}

async fn update_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
    axum::Json(patch): axum::Json<ReportPatch>,
) -> Response
where
    S: ReportStore + 'static,
{
    match api.service.update(&ReportId::new(report_id), patch).await {
        Ok(report) => (StatusCode::OK, axum::Json(report.view())).into_response(),
        Err(error) => service_error_response(error),
    }
}

async fn delete_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + 'static,
{
    match api.service.delete(&ReportId::new(report_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => service_error_response(error),
    }
}

async fn export_file_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
    body: Bytes,
) -> Response
where
    S: ReportStore + 'static,
{
    // an empty body means "use the default file name"
    let request = if body.is_empty() {
        FileExportRequest::default()
    } else {
        match serde_json::from_slice::<FileExportRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return error_body(StatusCode::BAD_REQUEST, format!("invalid request body: {err}"))
            }
        }
    };

    let id = ReportId::new(report_id);
    match api.exporter.export_to_file(&id, request.filename.as_deref()).await {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => export_error_response(error),
    }
}

async fn export_email_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
    axum::Json(request): axum::Json<EmailExportRequest>,
) -> Response
where
    S: ReportStore + 'static,
{
    let id = ReportId::new(report_id);
    let options = EmailOptions {
        subject: request.subject,
        body: request.body,
    };
    match api
        .exporter
        .export_to_email(&id, &request.address, options)
        .await
    {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => export_error_response(error),
    }
}

async fn export_print_handler<S>(
    State(api): State<ReportApi<S>>,
    Path(report_id): Path<String>,
) -> Response
where
    S: ReportStore + 'static,
{
    match api.exporter.export_to_print(&ReportId::new(report_id)).await {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => export_error_response(error),
    }
}
