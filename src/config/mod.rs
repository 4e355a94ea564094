//! Configuration management.
//!
//! The proxy reads one TOML file at startup:
//!
//! ```toml
//! port = "8888"
//! proxy_pass = "https://api.example.com/ingest"
//!
//! [logging]
//! format = "json"
//!
//! [[match.http]]
//! method = "POST"
//! path = "/v1/users"
//!
//! [[match.http.rule.body]]
//! whitelist = "$.user.id"
//!
//! [[match.http.rule.querystring]]
//! whitelist = "page"
//! ```
//!
//! Every whitelist pattern is compiled while loading. The resulting
//! [`ProxyConfig`] is immutable and shared by all request handlers.

mod selector;

pub use selector::{
    MatchClause, find_clause, is_same_case_insensitive, is_same_path, rules_at, select_rules,
};

use crate::redaction::RuleSet;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Listen port used when the configuration names none.
pub const DEFAULT_PORT: u16 = 8888;

/// Largest request body buffered for redaction, unless configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Validated proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream base URL every request is rewritten onto.
    pub proxy_pass: Url,
    /// Listen port.
    pub port: u16,
    /// Request bodies above this size are rejected.
    pub max_body_bytes: usize,
    /// Match clauses, in configuration order.
    pub clauses: Vec<MatchClause>,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Observability sections of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Output format: "pretty" or "json".
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `privacy_proxy=debug`.
    pub filter: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: Option<bool>,
    /// Port of the Prometheus scrape listener.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Listen port, as a string or an integer.
    pub port: Option<ConfigFilePort>,
    /// Upstream base URL.
    pub proxy_pass: Option<String>,
    /// Request body size limit in bytes.
    pub max_body_bytes: Option<usize>,
    /// Match clauses.
    #[serde(rename = "match")]
    pub match_options: Option<ConfigFileMatch>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Port value in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigFilePort {
    /// `port = 8888`
    Number(u16),
    /// `port = "8888"`
    Text(String),
}

/// `[match]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMatch {
    /// `[[match.http]]` clauses.
    #[serde(default)]
    pub http: Vec<ConfigFileHttpMatch>,
}

/// One `[[match.http]]` clause.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileHttpMatch {
    /// Method predicate.
    pub method: Option<String>,
    /// Path predicate.
    pub path: Option<String>,
    /// Whitelists.
    #[serde(default)]
    pub rule: ConfigFileRules,
}

/// `rule` table of a clause.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRules {
    /// Body location patterns.
    #[serde(default)]
    pub body: Vec<ConfigFileRule>,
    /// Querystring keys.
    #[serde(default)]
    pub querystring: Vec<ConfigFileRule>,
}

/// A single whitelist entry.
#[derive(Debug, Deserialize)]
pub struct ConfigFileRule {
    /// Pattern or key.
    pub whitelist: String,
}

impl ConfigFile {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMalformed`] if the text is not a valid config.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::ConfigMalformed(e.to_string()))
    }

    /// Applies `PRIVACY_PROXY_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(port) = lookup("PRIVACY_PROXY_PORT") {
            self.port = Some(ConfigFilePort::Text(port));
        }
        if let Some(target) = lookup("PRIVACY_PROXY_PASS") {
            self.proxy_pass = Some(target);
        }
        if let Some(format) = lookup("PRIVACY_PROXY_LOG_FORMAT") {
            self.logging.get_or_insert_with(LoggingSettings::default).format = Some(format);
        }
        if let Some(filter) = lookup("PRIVACY_PROXY_LOG") {
            self.logging.get_or_insert_with(LoggingSettings::default).filter = Some(filter);
        }
        if let Some(enabled) = lookup("PRIVACY_PROXY_METRICS_ENABLED") {
            let enabled = matches!(enabled.to_lowercase().as_str(), "true" | "1" | "yes");
            self.metrics.get_or_insert_with(MetricsSettings::default).enabled = Some(enabled);
        }
        if let Some(port) = lookup("PRIVACY_PROXY_METRICS_PORT").and_then(|p| p.parse().ok()) {
            self.metrics.get_or_insert_with(MetricsSettings::default).port = Some(port);
        }
    }
}

impl ProxyConfig {
    /// Creates a configuration with no match clauses.
    ///
    /// # Errors
    ///
    /// Returns an error if `proxy_pass` is empty or not an absolute HTTP(S) URL.
    pub fn new(proxy_pass: &str) -> Result<Self> {
        Ok(Self {
            proxy_pass: parse_proxy_target(Some(proxy_pass))?,
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            clauses: Vec::new(),
            observability: ObservabilitySettings::default(),
        })
    }

    /// Appends a match clause.
    #[must_use]
    pub fn with_clause(mut self, clause: MatchClause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request body size limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Loads configuration from a file, or from the default location when
    /// `path` is `None`, then applies environment overrides.
    ///
    /// A missing default file is not an error: the environment alone may
    /// provide the proxy target.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut file = match path {
            Some(path) => read_config_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(default) => read_config_file(&default)?,
                None => ConfigFile::default(),
            },
        };
        file.apply_env_overrides();
        Self::from_config_file(file)
    }

    /// Loads the default config file, if any, then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the default file exists but is invalid, or if no
    /// proxy target is configured anywhere.
    pub fn load_default() -> Result<Self> {
        Self::load(None)
    }

    /// Loads configuration from a file path, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::from_config_file(read_config_file(path)?)
    }

    /// Default config location: `<config dir>/privacy-proxy/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| {
            dirs.config_dir()
                .join("privacy-proxy")
                .join("config.toml")
        })
    }

    /// Validates a parsed file and compiles its whitelists.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: missing or invalid target,
    /// invalid port, or malformed whitelist pattern.
    pub fn from_config_file(file: ConfigFile) -> Result<Self> {
        let proxy_pass = parse_proxy_target(file.proxy_pass.as_deref())?;
        let port = match file.port {
            None => DEFAULT_PORT,
            Some(ConfigFilePort::Number(port)) => port,
            Some(ConfigFilePort::Text(text)) if text.trim().is_empty() => DEFAULT_PORT,
            Some(ConfigFilePort::Text(text)) => text
                .trim()
                .parse()
                .map_err(|_| Error::InvalidPort(text.clone()))?,
        };

        let clauses = file
            .match_options
            .map(|options| options.http)
            .unwrap_or_default()
            .into_iter()
            .map(clause_from_config_file)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            proxy_pass,
            port,
            max_body_bytes: file.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            clauses,
            observability: ObservabilitySettings {
                logging: file.logging,
                metrics: file.metrics,
            },
        })
    }

    /// Returns the rule set for a request's method and original path.
    #[must_use]
    pub fn select_rules(&self, method: &str, path: &str) -> &RuleSet {
        select_rules(&self.clauses, method, path)
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::parse(&contents)
}

/// An empty string predicate means "unset".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn clause_from_config_file(clause: ConfigFileHttpMatch) -> Result<MatchClause> {
    let rules = RuleSet::compile(
        clause.rule.body.iter().map(|rule| rule.whitelist.as_str()),
        clause.rule.querystring.into_iter().map(|rule| rule.whitelist),
    )?;
    Ok(MatchClause {
        method: non_empty(clause.method),
        path: non_empty(clause.path),
        rules,
    })
}

fn parse_proxy_target(proxy_pass: Option<&str>) -> Result<Url> {
    let raw = proxy_pass
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(Error::MissingProxyTarget)?;

    let invalid = |cause: String| Error::InvalidProxyTarget {
        url: raw.to_string(),
        cause,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
port = "9000"
proxy_pass = "https://api.example.com/ingest"
max_body_bytes = 1024

[logging]
format = "json"

[metrics]
enabled = true
port = 9191

[[match.http]]
method = "GET"
path = "/v1/whitelist"

[[match.http.rule.body]]
whitelist = "$.a.b"

[[match.http.rule.body]]
whitelist = "$.a.c"

[[match.http.rule.querystring]]
whitelist = "a"

[[match.http]]
method = "POST"
rule = { body = [{ whitelist = "$.items[*].id" }] }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ProxyConfig::from_config_file(ConfigFile::parse(FULL_CONFIG).unwrap()).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.proxy_pass.as_str(), "https://api.example.com/ingest");
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.clauses.len(), 2);

        let first = &config.clauses[0];
        assert_eq!(first.method.as_deref(), Some("GET"));
        assert_eq!(first.path.as_deref(), Some("/v1/whitelist"));
        assert_eq!(first.rules.body_patterns().len(), 2);
        assert_eq!(first.rules.querystring_keys(), ["a".to_string()]);

        let second = &config.clauses[1];
        assert_eq!(second.path, None);
        assert_eq!(second.rules.body_patterns()[0].as_str(), "$.items[*].id");

        let logging = config.observability.logging.unwrap();
        assert_eq!(logging.format.as_deref(), Some("json"));
        let metrics = config.observability.metrics.unwrap();
        assert_eq!(metrics.enabled, Some(true));
        assert_eq!(metrics.port, Some(9191));
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::from_config_file(
            ConfigFile::parse(r#"proxy_pass = "http://localhost:3000""#).unwrap(),
        )
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.clauses.is_empty());
    }

    #[test]
    fn test_integer_port() {
        let file = ConfigFile::parse("port = 7000\nproxy_pass = \"http://up\"").unwrap();
        assert_eq!(ProxyConfig::from_config_file(file).unwrap().port, 7000);
    }

    #[test]
    fn test_empty_predicates_are_unset() {
        let file = ConfigFile::parse(
            "proxy_pass = \"http://up\"\n[[match.http]]\nmethod = \"\"\npath = \"\"\n",
        )
        .unwrap();
        let config = ProxyConfig::from_config_file(file).unwrap();
        assert_eq!(config.clauses[0], MatchClause::new(RuleSet::empty()));
    }

    #[test]
    fn test_missing_proxy_pass() {
        let err = ProxyConfig::from_config_file(ConfigFile::default()).unwrap_err();
        assert!(matches!(err, Error::MissingProxyTarget));

        let err = ProxyConfig::new("  ").unwrap_err();
        assert!(matches!(err, Error::MissingProxyTarget));
    }

    #[test]
    fn test_invalid_proxy_pass() {
        for target in ["not a url", "/relative/path", "ftp://files.example.com"] {
            let err = ProxyConfig::new(target).unwrap_err();
            assert!(
                matches!(err, Error::InvalidProxyTarget { ref url, .. } if url == target),
                "{target}: {err}"
            );
        }
    }

    #[test]
    fn test_invalid_port() {
        let file = ConfigFile::parse("port = \"eighty\"\nproxy_pass = \"http://up\"").unwrap();
        let err = ProxyConfig::from_config_file(file).unwrap_err();
        assert!(matches!(err, Error::InvalidPort(ref p) if p == "eighty"));
    }

    #[test]
    fn test_invalid_pattern() {
        let file = ConfigFile::parse(
            "proxy_pass = \"http://up\"\n[[match.http]]\n[[match.http.rule.body]]\nwhitelist = \"a.b\"\n",
        )
        .unwrap();
        let err = ProxyConfig::from_config_file(file).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "a.b"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = ConfigFile::parse("proxy_pass = ").unwrap_err();
        assert!(matches!(err, Error::ConfigMalformed(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = ProxyConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProxyConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigUnreadable { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PRIVACY_PROXY_PORT", "9999"),
            ("PRIVACY_PROXY_PASS", "http://override:8080/base"),
            ("PRIVACY_PROXY_LOG_FORMAT", "json"),
            ("PRIVACY_PROXY_LOG", "debug"),
            ("PRIVACY_PROXY_METRICS_ENABLED", "yes"),
            ("PRIVACY_PROXY_METRICS_PORT", "9300"),
        ]
        .into_iter()
        .collect();

        let mut file = ConfigFile::parse(FULL_CONFIG).unwrap();
        file.apply_overrides(|key| vars.get(key).map(ToString::to_string));
        let config = ProxyConfig::from_config_file(file).unwrap();

        assert_eq!(config.port, 9999);
        assert_eq!(config.proxy_pass.as_str(), "http://override:8080/base");
        let logging = config.observability.logging.unwrap();
        assert_eq!(logging.format.as_deref(), Some("json"));
        assert_eq!(logging.filter.as_deref(), Some("debug"));
        let metrics = config.observability.metrics.unwrap();
        assert_eq!(metrics.enabled, Some(true));
        assert_eq!(metrics.port, Some(9300));
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let mut file = ConfigFile::parse(FULL_CONFIG).unwrap();
        file.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(file.port, Some(ConfigFilePort::Text("9000".to_string())));
    }

    #[test]
    fn test_select_rules_uses_original_path() {
        let config = ProxyConfig::from_config_file(ConfigFile::parse(FULL_CONFIG).unwrap()).unwrap();
        assert!(config.select_rules("GET", "/v1/whitelist/").allows_query_key("a"));
        assert!(config.select_rules("PUT", "/v1/whitelist").is_empty());
    }
}
