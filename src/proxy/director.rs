//! Request director.
//!
//! Rewrites one buffered incoming request into the request sent upstream:
//! the URL is moved onto the proxy target, the body and querystring are
//! redacted under the rule set selected for the original method and path,
//! and a marker header is attached.

use crate::codec::{self, CodecError};
use crate::config::{ProxyConfig, find_clause, rules_at};
use crate::redaction::{self, RuleSet};
use axum::body::Bytes;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use url::Url;

/// Header attached to every request that passed through redaction.
pub const REDACTED_MARKER_HEADER: HeaderName = HeaderName::from_static("x-privacy-proxy-redacted");

/// A request ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Unchanged incoming method.
    pub method: Method,
    /// Rewritten destination with a redacted querystring.
    pub url: Url,
    /// Incoming headers plus `Host`, the marker and, when a body was
    /// present, the new `Content-Length` with `Content-Encoding` removed.
    pub headers: HeaderMap,
    /// Redacted body.
    pub body: Bytes,
}

/// Outcome of directing one request.
#[derive(Debug)]
pub struct Directed {
    /// The rewritten request.
    pub request: OutboundRequest,
    /// Index of the match clause that supplied the rule set, if any.
    pub clause: Option<usize>,
    /// Set when the body could not be decoded and was dropped.
    pub body_error: Option<CodecError>,
}

/// Applies the redaction policy of a [`ProxyConfig`] to requests.
#[derive(Debug, Clone)]
pub struct Director {
    config: Arc<ProxyConfig>,
}

impl Director {
    /// Creates a director over a shared configuration.
    #[must_use]
    pub const fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Rewrites an incoming request.
    ///
    /// Never fails. A body that cannot be decoded is replaced by an empty one
    /// and reported through [`Directed::body_error`].
    #[must_use]
    pub fn handle(&self, request: Request<Bytes>) -> Directed {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        // Clauses name decoded paths.
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let clause = find_clause(&self.config.clauses, parts.method.as_str(), &decoded);
        let rules = rules_at(&self.config.clauses, clause);
        tracing::debug!(
            method = %parts.method,
            path = %decoded,
            clause = ?clause,
            "Selected rule set"
        );

        let mut url = merge_url(&self.config.proxy_pass, path, parts.uri.query());
        let query = url
            .query()
            .map(|raw| redaction::redact_query(rules, raw))
            .filter(|query| !query.is_empty());
        url.set_query(query.as_deref());

        let mut headers = parts.headers;
        if let Some(host) = host_header(&url) {
            headers.insert(HOST, host);
        }
        headers.append(REDACTED_MARKER_HEADER, HeaderValue::from_static("1"));

        let mut body_error = None;
        let body = if body.is_empty() {
            body
        } else {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            let redacted = match redact_body(rules, content_type, &body) {
                Ok(redacted) => Bytes::from(redacted),
                Err(err) => {
                    body_error = Some(err);
                    Bytes::new()
                },
            };
            headers.remove(CONTENT_ENCODING);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(redacted.len()));
            redacted
        };

        Directed {
            request: OutboundRequest {
                method: parts.method,
                url,
                headers,
                body,
            },
            clause,
            body_error,
        }
    }
}

/// Redacts a body according to its declared content type.
///
/// Bodies without a registered codec come back empty.
///
/// # Errors
///
/// Returns a [`CodecError`] if the body does not decode, or if the redacted
/// tree does not encode.
pub fn redact_body(rules: &RuleSet, content_type: &str, body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let Some(codec) = codec::codec_for(content_type) else {
        return Ok(Vec::new());
    };
    let tree = codec.decode(body)?;
    codec.encode(&redaction::redact(rules, &tree))
}

/// Moves an incoming path and querystring onto the target URL.
///
/// The incoming querystring replaces the target's. Fragments are dropped.
#[must_use]
pub fn merge_url(target: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = target.clone();
    url.set_path(&join_paths(target.path(), path));
    url.set_query(query);
    url.set_fragment(None);
    url
}

/// Appends a cleaned incoming path to a base path.
///
/// The incoming path is resolved on its own, so `..` stops at its root and
/// never removes base segments. Empty segments and trailing slashes are
/// dropped. A `\` inside a segment is escaped as `%5C` so the URL parser
/// cannot read it as a separator.
#[must_use]
pub fn join_paths(base: &str, incoming: &str) -> String {
    let mut cleaned: Vec<String> = Vec::new();
    for segment in incoming.split('/') {
        if segment.is_empty() || is_dot(segment) {
            continue;
        }
        if is_dot_dot(segment) {
            cleaned.pop();
            continue;
        }
        cleaned.push(segment.replace('\\', "%5C"));
    }

    let joined = base
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .chain(cleaned)
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

// Percent-encoded dots count too: the URL parser resolves them later.
fn is_dot(segment: &str) -> bool {
    segment == "." || segment.eq_ignore_ascii_case("%2e")
}

fn is_dot_dot(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        ".." | ".%2e" | "%2e." | "%2e%2e"
    )
}

/// `Host` value for a URL: the host, plus the port when it is not the
/// scheme's default.
#[must_use]
pub fn host_header(url: &Url) -> Option<HeaderValue> {
    let host = url.host_str()?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchClause;
    use test_case::test_case;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test_case("https://api.usebutton.com/", "/", None, "https://api.usebutton.com/" ; "with the root")]
    #[test_case("https://api.usebutton.com/v1", "/", None, "https://api.usebutton.com/v1" ; "with a root source")]
    #[test_case("https://api.usebutton.com/", "/v1", None, "https://api.usebutton.com/v1" ; "with a root destination")]
    #[test_case("https://api.usebutton.com/ingest", "/v1/users", None, "https://api.usebutton.com/ingest/v1/users" ; "with two paths")]
    #[test_case("https://api.usebutton.com/ingest", "/v1/users/", None, "https://api.usebutton.com/ingest/v1/users" ; "with a trailing slash")]
    #[test_case("https://api.usebutton.com/ingest?a=2", "/v1", Some("b=3"), "https://api.usebutton.com/ingest/v1?b=3" ; "with a new querystring")]
    #[test_case("https://api.usebutton.com/ingest?a=2", "/v1", None, "https://api.usebutton.com/ingest/v1" ; "with no incoming querystring")]
    #[test_case("http://localhost:3000/", "/v1", None, "http://localhost:3000/v1" ; "with a port")]
    fn test_merge_url(target: &str, path: &str, query: Option<&str>, expected: &str) {
        assert_eq!(merge_url(&url(target), path, query).as_str(), expected);
    }

    #[test_case("/ingest", "/../../admin", "/ingest/admin" ; "dot dot stops at the incoming root")]
    #[test_case("/ingest", "/a/./b/../c", "/ingest/a/c" ; "dot segments resolve")]
    #[test_case("/ingest", "//a///b", "/ingest/a/b" ; "repeated slashes collapse")]
    #[test_case("/ingest", "/%2e%2e/admin", "/ingest/admin" ; "encoded dot dot")]
    #[test_case("/ingest", "/.%2E/admin", "/ingest/admin" ; "mixed encoded dot dot")]
    #[test_case("/ingest", "/..\\admin", "/ingest/..%5Cadmin" ; "backslash is not a separator")]
    #[test_case("/ingest", "/a/..\\..\\admin", "/ingest/a/..%5C..%5Cadmin" ; "backslash dot dot stays inside")]
    #[test_case("/", "", "/" ; "both empty")]
    #[test_case("/ingest", "", "/ingest" ; "empty incoming path")]
    fn test_join_paths(base: &str, incoming: &str, expected: &str) {
        assert_eq!(join_paths(base, incoming), expected);
    }

    #[test]
    fn test_merge_url_cannot_escape_base_path() {
        let merged = merge_url(&url("https://api.example.com/ingest"), "/%2e%2e/admin", None);
        assert_eq!(merged.path(), "/ingest/admin");
    }

    #[test_case("/..\\admin", "https://api.example.com/ingest/..%5Cadmin" ; "leading backslash dot dot")]
    #[test_case("/a/..\\..\\admin", "https://api.example.com/ingest/a/..%5C..%5Cadmin" ; "nested backslash dot dot")]
    #[test_case("/%2e%2e%5c..%5cadmin", "https://api.example.com/ingest/%2e%2e%5c..%5cadmin" ; "encoded backslash")]
    fn test_merge_url_keeps_backslash_inside_base(path: &str, expected: &str) {
        let merged = merge_url(&url("https://api.example.com/ingest"), path, None);
        assert_eq!(merged.as_str(), expected);
        assert!(merged.path().starts_with("/ingest/"));
    }

    #[test_case("https://api.example.com/x", "api.example.com" ; "default https port")]
    #[test_case("http://api.example.com:80/", "api.example.com" ; "explicit default http port")]
    #[test_case("http://localhost:3000/", "localhost:3000" ; "custom port")]
    #[test_case("http://[::1]:8080/", "[::1]:8080" ; "ipv6 literal")]
    fn test_host_header(target: &str, expected: &str) {
        assert_eq!(host_header(&url(target)).unwrap(), expected);
    }

    #[test]
    fn test_redact_body_without_rules() {
        let out = redact_body(&RuleSet::empty(), "application/json", br#"{"a":"x"}"#).unwrap();
        assert_eq!(out, br#"{"a":"REDACTED"}"#);
    }

    #[test]
    fn test_redact_body_with_whitelist() {
        let rules = RuleSet::compile(["$.a.b"], Vec::<String>::new()).unwrap();
        let out = redact_body(&rules, "application/json; charset=utf-8", br#"{"a":{"b":10}}"#).unwrap();
        assert_eq!(out, br#"{"a":{"b":10}}"#);
    }

    #[test_case("application/graphql" ; "unsupported type")]
    #[test_case("" ; "missing type")]
    #[test_case("text/plain" ; "plain text")]
    fn test_redact_body_drops_unknown_types(content_type: &str) {
        let rules = RuleSet::compile(["$.a"], ["a"]).unwrap();
        let out = redact_body(&rules, content_type, br#"{"a":"x"}"#).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_redact_body_reports_malformed_json() {
        let err = redact_body(&RuleSet::empty(), "application/json", b"{ query }").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_handle_keeps_empty_body_without_length() {
        let config = ProxyConfig::new("https://api.example.com/ingest").unwrap();
        let director = Director::new(Arc::new(config));
        let request = Request::builder()
            .method("GET")
            .uri("/v1?x=1")
            .body(Bytes::new())
            .unwrap();

        let directed = director.handle(request);
        assert!(directed.request.body.is_empty());
        assert!(directed.request.headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(directed.request.headers[&REDACTED_MARKER_HEADER], "1");
        assert_eq!(directed.request.headers[HOST], "api.example.com");
        assert_eq!(
            directed.request.url.as_str(),
            "https://api.example.com/ingest/v1?x=REDACTED"
        );
        assert_eq!(directed.clause, None);
        assert!(directed.body_error.is_none());
    }

    #[test]
    fn test_handle_matches_decoded_path() {
        let config = ProxyConfig::new("https://api.example.com/")
            .unwrap()
            .with_clause(MatchClause::new(RuleSet::empty()).with_path("/users/a b"));
        let director = Director::new(Arc::new(config));
        let request = Request::builder()
            .method("GET")
            .uri("/users/a%20b")
            .body(Bytes::new())
            .unwrap();

        let directed = director.handle(request);
        assert_eq!(directed.clause, Some(0));
        assert_eq!(directed.request.url.path(), "/users/a%20b");
    }

    #[test]
    fn test_handle_drops_content_encoding_with_replaced_body() {
        let config = ProxyConfig::new("https://api.example.com/").unwrap();
        let director = Director::new(Arc::new(config));
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(Bytes::from_static(b"\x1f\x8b\x08\x00"))
            .unwrap();

        let directed = director.handle(request);
        assert!(directed.request.body.is_empty());
        assert!(directed.body_error.is_some());
        assert!(directed.request.headers.get(CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_handle_keeps_content_encoding_without_body() {
        let config = ProxyConfig::new("https://api.example.com/").unwrap();
        let director = Director::new(Arc::new(config));
        let request = Request::builder()
            .method("GET")
            .uri("/")
            .header(CONTENT_ENCODING, "gzip")
            .body(Bytes::new())
            .unwrap();

        let directed = director.handle(request);
        assert_eq!(directed.request.headers[CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn test_handle_replaces_malformed_body() {
        let config = ProxyConfig::new("https://api.example.com/").unwrap();
        let director = Director::new(Arc::new(config));
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, "9")
            .body(Bytes::from_static(b"{ query }"))
            .unwrap();

        let directed = director.handle(request);
        assert!(directed.request.body.is_empty());
        assert_eq!(directed.request.headers[CONTENT_LENGTH], "0");
        assert!(directed.body_error.is_some());
    }
}
