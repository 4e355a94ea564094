//! # Privacy Proxy
//!
//! A reverse proxy that redacts request data by default.
//!
//! Every request body and querystring passing through the proxy is rewritten
//! so that its values are replaced with placeholders, while the shape of the
//! data (object keys, array lengths, value types) is preserved. Operators
//! whitelist individual locations per route, and only those values reach the
//! upstream unchanged.
//!
//! ## Components
//!
//! - [`redaction`]: location patterns, rule sets, tree and querystring redaction
//! - [`codec`]: content-type lookup and the JSON codec
//! - [`config`]: TOML configuration and rule selection
//! - [`proxy`]: the request director and the HTTP transport
//! - [`observability`]: logging, metrics and request ids
//!
//! ## Example
//!
//! ```rust
//! use privacy_proxy::codec::{ContentCodec, JsonCodec};
//! use privacy_proxy::redaction::{RuleSet, redact};
//!
//! let rules = RuleSet::compile(["$.user.id"], ["page"]).unwrap();
//! let body = JsonCodec.decode(br#"{"user": {"id": 7, "email": "a@b.c"}}"#).unwrap();
//! let redacted = JsonCodec.encode(&redact(&rules, &body)).unwrap();
//!
//! assert_eq!(redacted, br#"{"user":{"email":"REDACTED","id":7}}"#);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod codec;
pub mod config;
pub mod models;
pub mod observability;
pub mod proxy;
pub mod redaction;

pub use codec::{CodecError, ContentCodec, JsonCodec};
pub use config::{MatchClause, ProxyConfig};
pub use models::TreeValue;
pub use proxy::{Directed, Director, OutboundRequest, ProxyServer};
pub use redaction::{LocationPath, LocationPattern, RuleSet, redact, redact_query};

/// Error type for privacy proxy operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `ConfigUnreadable` | The configuration file cannot be read |
/// | `ConfigMalformed` | The configuration file is not valid TOML for the schema |
/// | `MissingProxyTarget` | No `proxy_pass` is configured |
/// | `InvalidProxyTarget` | `proxy_pass` is not an absolute HTTP(S) URL |
/// | `InvalidPort` | The listen port is not a valid port number |
/// | `InvalidPattern` | A body whitelist pattern does not compile |
/// | `OperationFailed` | Binding, serving, or observability setup fails |
///
/// All variants except `OperationFailed` are raised while loading the
/// configuration, before any request is accepted.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("cannot read configuration file {}: {source}", .path.display())]
    ConfigUnreadable {
        /// Path that was read.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("malformed configuration: {0}")]
    ConfigMalformed(String),

    /// No upstream target is configured.
    #[error("missing proxy target: set `proxy_pass` in the configuration file")]
    MissingProxyTarget,

    /// The upstream target is not a usable URL.
    #[error("invalid proxy target '{url}': {cause}")]
    InvalidProxyTarget {
        /// The configured value.
        url: String,
        /// Why it was rejected.
        cause: String,
    },

    /// The listen port is not a number in `0..=65535`.
    #[error("invalid listen port '{0}'")]
    InvalidPort(String),

    /// A body whitelist pattern is malformed.
    #[error("invalid whitelist pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// The syntax problem.
        #[source]
        source: redaction::PatternError,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for privacy proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
