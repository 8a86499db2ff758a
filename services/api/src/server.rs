use crate::cli::ServeArgs;
use crate::infra::{AppState, ReportStack};
use crate::routes::with_report_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use site_reports::config::AppConfig;
use site_reports::error::AppError;
use site_reports::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn apply_overrides(config: &mut AppConfig, args: ServeArgs) {
    let ServeArgs {
        host,
        port,
        export_dir,
    } = args;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(export_dir) = export_dir {
        config.export.output_dir = export_dir;
    }
}

pub(crate) async fn run(args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, args);
    telemetry::init(&config.telemetry)?;

    // the download route reads from here before any export has run
    tokio::fs::create_dir_all(&config.export.output_dir).await?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness.clone(),
        metrics: Arc::new(prometheus_handle),
        export_dir: config.export.output_dir.clone(),
    };

    let stack = ReportStack::in_memory(&config);
    let app = with_report_routes(stack.service, stack.exporter)
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        export_dir = %config.export.output_dir.display(),
        export_timeout_secs = config.export.timeout_secs,
        "site report service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness))
        .await?;
    info!("site report service stopped");
    Ok(())
}

/// Resolves on Ctrl-C; readiness drops first so load balancers stop routing.
async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("shutdown signal unavailable: {err}");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use site_reports::config::{
        AppEnvironment, ExportConfig, ServerConfig, SessionConfig, TelemetryConfig,
    };
    use std::path::PathBuf;

    fn config() -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                span_events: false,
            },
            export: ExportConfig::default(),
            session: SessionConfig {
                user_id: "system".to_string(),
            },
        }
    }

    #[test]
    fn cli_flags_override_loaded_config() {
        let mut config = config();
        apply_overrides(
            &mut config,
            ServeArgs {
                host: Some("0.0.0.0".to_string()),
                port: None,
                export_dir: Some(PathBuf::from("/tmp/reports")),
            },
        );
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/reports"));
    }
}
