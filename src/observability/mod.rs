//! Observability: structured logging, Prometheus metrics and request ids.

mod logging;
mod metrics;
mod request_context;

pub use logging::{LogFormat, LoggingConfig};
pub use metrics::{
    BODY_DECODE_ERRORS_TOTAL, BODY_REJECTED_TOTAL, DEFAULT_METRICS_PORT, MetricsConfig,
    REQUESTS_TOTAL, UPSTREAM_ERRORS_TOTAL, install_prometheus,
};
pub use request_context::{
    REQUEST_ID_HEADER, RequestContext, current_request_id, scope_request_context,
};

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Full observability configuration.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Options supplied on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested.
    pub verbose: bool,
    /// Log format forced on the command line.
    pub log_format: Option<LogFormat>,
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes observability from config settings and CLI options.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if any
/// component fails to initialize.
pub fn init_from_config(
    settings: &ObservabilitySettings,
    options: InitOptions,
) -> Result<()> {
    init(build_config(settings, options))
}

fn build_config(settings: &ObservabilitySettings, options: InitOptions) -> ObservabilityConfig {
    let mut logging = LoggingConfig::from_settings(settings.logging.as_ref(), options.verbose);
    if let Some(format) = options.log_format {
        logging.format = format;
    }
    let metrics = MetricsConfig::from_settings(settings.metrics.as_ref());

    ObservabilityConfig { logging, metrics }
}

/// Initializes logging and metrics for the process.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if any
/// component fails to initialize.
pub fn init(config: ObservabilityConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.logging.filter())
                .try_init()
                .map_err(init_error)?;
        },
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
                .with(config.logging.filter())
                .try_init()
                .map_err(init_error)?;
        },
    }

    // After logging, so the listener address is logged.
    install_prometheus(&config.metrics)?;

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "failed to mark observability initialized".to_string(),
        })
}

/// Helper to convert init errors.
#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    }
}
