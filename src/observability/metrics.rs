//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port of the metrics listener when none is configured.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Counter of proxied requests, labelled by `ruleset`.
pub const REQUESTS_TOTAL: &str = "privacy_proxy_requests_total";

/// Counter of request bodies that failed to decode.
pub const BODY_DECODE_ERRORS_TOTAL: &str = "privacy_proxy_body_decode_errors_total";

/// Counter of upstream request failures.
pub const UPSTREAM_ERRORS_TOTAL: &str = "privacy_proxy_upstream_errors_total";

/// Counter of request bodies rejected before redaction.
pub const BODY_REJECTED_TOTAL: &str = "privacy_proxy_body_rejected_total";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings.
    ///
    /// Environment overrides are already folded into the settings by the
    /// config loader.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

/// Installs the Prometheus recorder and its HTTP listener on the current
/// Tokio runtime.
///
/// Returns `None` when metrics are disabled; the `metrics` macros are then
/// no-ops.
///
/// # Errors
///
/// Returns an error if called outside a Tokio runtime, if the exporter cannot
/// be built, or if a global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new().with_http_listener(config.listen_addr);
    let handle = install_listener(builder)?;
    tracing::info!(addr = %config.listen_addr, "Prometheus metrics listener installed");
    Ok(Some(handle))
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    let handle = tokio::runtime::Handle::try_current().map_err(|e| Error::OperationFailed {
        operation: "metrics_listener_install".to_string(),
        cause: e.to_string(),
    })?;
    install_with_runtime(builder, &handle)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}
