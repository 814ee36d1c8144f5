//! Error type for the proxy engine.

use hyper::StatusCode;
use thiserror::Error;

use tether_core::{BuildError, RouteError};

/// Everything that can go wrong while starting or running the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The upstream HTTP exchange failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] hyper::Error),

    /// No routing decision could be made.
    #[error("routing error: {0}")]
    Route(#[from] RouteError),

    /// A backend snapshot could not be built into a table.
    #[error("table build error: {0}")]
    Build(#[from] BuildError),

    /// The rewritten upstream URI was invalid.
    #[error("invalid upstream URI: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    /// A backend identifier or peer list is not a valid header value.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] hyper::header::InvalidHeaderValue),

    /// TLS configuration was rejected.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The key file held no PKCS#8 private key.
    #[error("no PKCS#8 private key found in {0}")]
    MissingPrivateKey(String),

    /// The static backend list was empty or malformed.
    #[error("invalid static backend list: {0}")]
    InvalidBackends(String),

    /// The backend source finished without producing a usable snapshot.
    #[error("backend source ended before producing a usable snapshot")]
    SourceEnded,
}

impl ProxyError {
    /// HTTP status reported to the client when forwarding fails.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Route(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
