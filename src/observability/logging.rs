//! Structured logging.

use crate::config::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Filter used when neither the config file nor `RUST_LOG` names one.
const DEFAULT_FILTER: &str = "privacy_proxy=info,tower_http=info";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "privacy_proxy=debug,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub directive: String,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings.
    ///
    /// The config file's filter wins over `RUST_LOG`, which wins over the
    /// built-in default. `verbose` only raises the built-in default.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, std::env::var("RUST_LOG").ok())
    }

    fn resolve(settings: Option<&LoggingSettings>, verbose: bool, rust_log: Option<String>) -> Self {
        let format = settings
            .and_then(|cfg| cfg.format.as_deref())
            .map(LogFormat::parse)
            .unwrap_or_default();
        let directive = settings
            .and_then(|cfg| cfg.filter.clone())
            .or(rust_log)
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| {
                if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }.to_string()
            });
        Self { format, directive }
    }

    /// Builds the filter, falling back to the default on a bad directive.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
