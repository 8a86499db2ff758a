use crate::config::TelemetryConfig;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Transport crates that would otherwise drown report events at debug level.
const QUIET_TARGETS: [&str; 2] = ["hyper=warn", "tower=warn"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{value}'")]
    Filter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("tracing subscriber could not be installed: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// `RUST_LOG` wins over the configured level. Transport noise is capped
/// unless the filter names those targets itself.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let raw = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.log_level.clone());

    let mut filter = EnvFilter::try_new(&raw).map_err(|source| TelemetryError::Filter {
        value: raw.clone(),
        source,
    })?;
    for quiet in QUIET_TARGETS {
        let target = quiet.split('=').next().unwrap_or(quiet);
        if raw.contains(target) {
            continue;
        }
        let directive: Directive = quiet.parse().map_err(|source| TelemetryError::Filter {
            value: quiet.to_string(),
            source,
        })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the process-wide subscriber. Report components emit events under
/// the span their caller hands them; with `span_events` on, the close of each
/// span is logged with its timing.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let span_events = if config.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(config)?)
        .with_span_events(span_events)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
