//! Request routing and forwarding.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::{Request, Response, StatusCode, Uri};
use tracing::{debug, warn};

use tether_core::routing::headers::{
    HEADER_GENERATION, HEADER_PREVIOUS_PEERS, HEADER_PREVIOUS_PRIMARY, HEADER_REPLICATION_PEERS,
};
use tether_core::{KeyExtractor, RoutingHandle};

use crate::connection_pool::ConnectionPool;
use crate::error::ProxyError;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Response body type produced by the proxy.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Extracts the routing key from a request header.
///
/// A missing or non-UTF-8 header yields the empty key.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    header: HeaderName,
}

impl HeaderKey {
    /// Key requests by the value of `header`.
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl<B> KeyExtractor<Request<B>> for HeaderKey {
    fn extract(&self, request: &Request<B>) -> String {
        request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

/// Forwards each request to the primary backend chosen for its key.
#[derive(Debug)]
pub struct HandoffProxy {
    routing: RoutingHandle,
    keys: HeaderKey,
    dest_port: u16,
    pool: ConnectionPool,
}

impl HandoffProxy {
    /// Create a proxy forwarding to `dest_port` on the chosen backends.
    pub fn new(routing: RoutingHandle, keys: HeaderKey, dest_port: u16) -> Self {
        Self {
            routing,
            keys,
            dest_port,
            pool: ConnectionPool::new(),
        }
    }

    /// Handles one client request from `peer`, turning failures into error responses.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let method = req.method().clone();
        let uri = req.uri().clone();

        match self.forward(req, peer.ip()).await {
            Ok(response) => Ok(response.map(|body| body.boxed())),
            Err(err) => {
                warn!(%method, %uri, error = %err, "request failed");
                Ok(error_response(err.status()))
            }
        }
    }

    async fn forward(
        &self,
        mut req: Request<Incoming>,
        client: IpAddr,
    ) -> Result<Response<Incoming>, ProxyError> {
        let key = self.keys.extract(&req);
        let token = req
            .headers()
            .get(HEADER_GENERATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let decision = self.routing.route(&key, token.as_deref())?;
        let authority = format!("{}:{}", decision.primary().id.trim(), self.dest_port);
        debug!(key = %key, %authority, "forwarding request");

        let path = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .parse::<Uri>()?;
        *req.uri_mut() = path;

        let headers = req.headers_mut();
        prepare_upstream_headers(headers, client)?;
        headers.insert(HOST, HeaderValue::from_str(&authority)?);
        for (name, value) in decision.handoff_headers() {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_str(&value)?);
        }

        let mut sender = self.pool.checkout(&authority).await?;
        let response = sender.send_request(req).await?;
        self.pool.release(authority, sender);

        Ok(response)
    }
}

/// Drops connection-scoped and hand-off headers, then records the client in
/// `x-forwarded-for`.
fn prepare_upstream_headers(headers: &mut HeaderMap, client: IpAddr) -> Result<(), ProxyError> {
    // Names listed in `Connection` are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    // Clients must not be able to forge hand-off signals.
    for name in [
        HEADER_GENERATION,
        HEADER_REPLICATION_PEERS,
        HEADER_PREVIOUS_PEERS,
        HEADER_PREVIOUS_PRIMARY,
    ] {
        headers.remove(name);
    }

    let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{prior}, {client}"),
        _ => client.to_string(),
    };
    headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded)?);
    Ok(())
}

fn error_response(status: StatusCode) -> Response<ProxyBody> {
    let reason = status.canonical_reason().unwrap_or("proxy error");
    let body = Full::new(Bytes::from(reason))
        .map_err(|never| match never {})
        .boxed();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
