use crate::config::ConfigError;
use crate::reports::router;
use crate::reports::{ExportError, ReportServiceError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Report(ReportServiceError),
    Export(ExportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Report(err) => write!(f, "report error: {}", err),
            AppError::Export(err) => write!(f, "export error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Report(err) => Some(err),
            AppError::Export(err) => Some(err),
        }
    }
}

/// Report and export failures use the same status mapping as the report
/// routes; everything else is an internal error.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Report(err) => router::service_error_response(err),
            AppError::Export(err) => router::export_error_response(err),
            other => {
                let body = Json(json!({ "error": other.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ReportServiceError> for AppError {
    fn from(value: ReportServiceError) -> Self {
        Self::Report(value)
    }
}

impl From<ExportError> for AppError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{ExportChannel, ExportChannelError, ReportId};

    #[test]
    fn report_errors_keep_their_route_status() {
        let missing = AppError::from(ReportServiceError::NotFound(ReportId::new("r-1")));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let anonymous = AppError::from(ReportServiceError::Unauthenticated);
        assert_eq!(anonymous.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn channel_failures_are_bad_gateway() {
        let err = AppError::from(ExportError::from(ExportChannelError::Timeout {
            channel: ExportChannel::Print,
            after: std::time::Duration::from_secs(30),
        }));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn io_errors_are_internal() {
        let err = AppError::from(std::io::Error::other("disk full"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(AppError::from(std::io::Error::other("x")).to_string().starts_with("io error"));
    }
}
