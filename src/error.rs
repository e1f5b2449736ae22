//! Error types for the aggregator subsystems.

use std::io;
use std::net::SocketAddr;

use reqwest::StatusCode;
use thiserror::Error;

/// Fatal failures of the discovery listener.
///
/// Once the listener returns one of these it has stopped; nothing re-binds
/// the socket.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to join multicast group {addr}: {source}")]
    JoinGroup { addr: SocketAddr, source: io::Error },

    #[error("failed to read discovery socket address: {0}")]
    LocalAddr(io::Error),

    #[error("failed to receive on discovery socket {addr}: {source}")]
    Recv { addr: SocketAddr, source: io::Error },
}

/// A datagram that does not carry a valid announcement.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedAnnouncement {
    #[error("expected {expected} bytes, got {len}")]
    Length { expected: usize, len: usize },

    #[error("announced port 0")]
    ZeroPort,
}

/// Reasons a single upstream query failed.
///
/// Every variant is treated the same by the aggregator: the upstream is
/// evicted from the registry.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code {0}")]
    UnexpectedStatus(StatusCode),

    #[error("unexpected content type {0:?}")]
    UnexpectedContentType(String),

    #[error("unexpected server response: {0}")]
    UnexpectedResponse(#[from] serde_json::Error),

    #[error("unexpected server document: {0}")]
    UnexpectedDocument(&'static str),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

/// Failures of the HTTP gateway itself.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to bind http listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("http server error: {0}")]
    Serve(io::Error),
}
