//! Request rewriting and the HTTP proxy server.
//!
//! [`Director`] holds the per-request policy and has no I/O of its own.
//! [`ProxyServer`] is the transport around it.

mod director;
mod server;

pub use director::{
    Directed, Director, OutboundRequest, REDACTED_MARKER_HEADER, host_header, join_paths,
    merge_url, redact_body,
};
pub use server::{ProxyServer, strip_hop_by_hop};
