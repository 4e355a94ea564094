//! HTTP transport.
//!
//! Accepts every method and path, buffers the body, hands the request to the
//! [`Director`] and forwards the result upstream. Upstream responses are
//! relayed unmodified apart from hop-by-hop headers.

use super::director::{Director, OutboundRequest};
use crate::config::ProxyConfig;
use crate::observability::{
    BODY_DECODE_ERRORS_TOTAL, BODY_REJECTED_TOTAL, REQUEST_ID_HEADER, REQUESTS_TOTAL,
    RequestContext, UPSTREAM_ERRORS_TOTAL, current_request_id, scope_request_context,
};
use crate::{Error, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Headers that describe a single connection and are never forwarded.
static HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

struct ProxyState {
    director: Director,
    client: reqwest::Client,
    max_body_bytes: usize,
}

/// The privacy proxy HTTP server.
pub struct ProxyServer {
    state: Arc<ProxyState>,
    port: u16,
}

impl ProxyServer {
    /// Creates a server for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self> {
        // Redirects are relayed to the client, not followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "http_client_init".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            port: config.port,
            state: Arc::new(ProxyState {
                max_body_bytes: config.max_body_bytes,
                director: Director::new(config),
                client,
            }),
        })
    }

    /// Builds the router. Every request falls through to the proxy handler.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_request)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Binds `0.0.0.0:<port>` and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound or serving fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "bind".to_string(),
                cause: format!("{addr}: {e}"),
            })?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let config = self.state.director.config();
        tracing::info!(
            addr = %listener.local_addr().map_or_else(|_| "unknown".to_string(), |a| a.to_string()),
            target = %config.proxy_pass,
            clauses = config.clauses.len(),
            "Privacy proxy listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "serve".to_string(),
                cause: e.to_string(),
            })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn proxy_request(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let context = RequestContext::from_headers(request.headers());
    let span = tracing::info_span!(
        "proxy_request",
        request_id = context.request_id(),
        method = %request.method(),
        path = request.uri().path(),
    );
    scope_request_context(context, forward(&state, request))
        .instrument(span)
        .await
}

async fn forward(state: &ProxyState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            metrics::counter!(BODY_REJECTED_TOTAL).increment(1);
            tracing::warn!(
                error = %e,
                limit = state.max_body_bytes,
                "Request body rejected; nothing forwarded"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body rejected").into_response();
        },
    };

    let directed = state
        .director
        .handle(axum::http::Request::from_parts(parts, body));
    let ruleset = if directed.clause.is_some() { "matched" } else { "default" };
    metrics::counter!(REQUESTS_TOTAL, "ruleset" => ruleset).increment(1);
    if let Some(err) = &directed.body_error {
        metrics::counter!(BODY_DECODE_ERRORS_TOTAL).increment(1);
        tracing::warn!(error = %err, "Request body could not be redacted; forwarding an empty body");
    }

    let mut outbound = directed.request;
    if !outbound.headers.contains_key(&REQUEST_ID_HEADER)
        && let Some(id) = current_request_id()
        && let Ok(value) = HeaderValue::from_str(&id)
    {
        outbound.headers.insert(&REQUEST_ID_HEADER, value);
    }

    match send_upstream(&state.client, outbound).await {
        Ok(response) => relay_response(response).await,
        Err(e) => {
            metrics::counter!(UPSTREAM_ERRORS_TOTAL).increment(1);
            tracing::error!(error = %e, "Upstream request failed");
            StatusCode::BAD_GATEWAY.into_response()
        },
    }
}

async fn send_upstream(
    client: &reqwest::Client,
    request: OutboundRequest,
) -> reqwest::Result<reqwest::Response> {
    let OutboundRequest {
        method,
        url,
        mut headers,
        body,
    } = request;
    strip_hop_by_hop(&mut headers);
    client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
}

async fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    match upstream.bytes().await {
        Ok(body) => {
            tracing::debug!(status = status.as_u16(), bytes = body.len(), "Relaying upstream response");
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        },
        Err(e) => {
            metrics::counter!(UPSTREAM_ERRORS_TOTAL).increment(1);
            tracing::error!(error = %e, "Failed to read upstream response");
            StatusCode::BAD_GATEWAY.into_response()
        },
    }
}

/// Removes hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_new_uses_configured_port() {
        let config = ProxyConfig::new("http://127.0.0.1:1/").unwrap().with_port(9999);
        let server = ProxyServer::new(Arc::new(config)).unwrap();
        assert_eq!(server.port, 9999);
    }
}
