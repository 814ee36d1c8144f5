//! Server module for handling incoming connections and HTTP parsing.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::proxy::HandoffProxy;

/// Serves client connections accepted on `listener` until accepting fails.
pub async fn start_server(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    proxy: Arc<HandoffProxy>,
) -> Result<(), ProxyError> {
    info!(addr = %listener.local_addr()?, tls = tls_acceptor.is_some(), "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let proxy = Arc::clone(&proxy);
        let service = service_fn(move |req| {
            let proxy = Arc::clone(&proxy);
            async move { proxy.handle(req, peer).await }
        });

        if let Some(acceptor) = &tls_acceptor {
            let acceptor = acceptor.clone();
            tokio::task::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        let io = TokioIo::new(tls_stream);
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!(%peer, error = %err, "error serving connection");
                        }
                    }
                    Err(err) => warn!(%peer, error = %err, "TLS handshake failed"),
                }
            });
        } else {
            // Unencrypted fallback
            let io = TokioIo::new(stream);
            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %err, "error serving connection");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;

    use http_body_util::Full;
    use hyper::body::{Bytes, Incoming};
    use hyper::header::HeaderName;
    use hyper::{Request, Response, StatusCode};
    use tether_core::maglev::build;
    use tether_core::routing::headers::{
        HEADER_GENERATION, HEADER_PREVIOUS_PEERS, HEADER_PREVIOUS_PRIMARY,
        HEADER_REPLICATION_PEERS,
    };
    use tether_core::{Backend, Generation, RouteState, RoutingHandle, VersionedRouter};

    use super::*;
    use crate::proxy::HeaderKey;

    const ECHOED: [&str; 4] = [
        HEADER_GENERATION,
        HEADER_REPLICATION_PEERS,
        HEADER_PREVIOUS_PRIMARY,
        HEADER_PREVIOUS_PEERS,
    ];

    /// Upstream answering with one `name: value` line per hand-off header it received.
    async fn spawn_upstream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let lines: Vec<String> = ECHOED
                            .iter()
                            .filter_map(|name| {
                                let value = req.headers().get(*name)?.to_str().ok()?;
                                Some(format!("{name}: {value}"))
                            })
                            .collect();
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(lines.join("\n")))))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        port
    }

    async fn spawn_proxy(routing: RoutingHandle, dest_port: u16) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = Arc::new(HandoffProxy::new(
            routing,
            HeaderKey::new(HeaderName::from_static("x-room-id")),
            dest_port,
        ));
        tokio::spawn(start_server(listener, None, proxy));
        addr
    }

    async fn fetch(addr: SocketAddr, room: &str, extra: &[(&str, &str)]) -> (StatusCode, String) {
        let mut request = reqwest::Client::new()
            .get(format!("http://{addr}/rooms/{room}"))
            .header("x-room-id", room);
        for (name, value) in extra {
            request = request.header(*name, *value);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    #[tokio::test]
    async fn test_forwards_with_generation_header() {
        let upstream_port = spawn_upstream().await;
        let router = Arc::new(VersionedRouter::new(5));
        router.add_generation(
            Generation(1),
            build(vec![Backend::new("127.0.0.1")], 7).unwrap(),
        );
        let routing = RoutingHandle::Versioned {
            router,
            replica_count: 1,
            max_jumps: 5,
        };
        let addr = spawn_proxy(routing, upstream_port).await;

        for _ in 0..2 {
            let (status, body) = fetch(addr, "lobby", &[(HEADER_GENERATION, "99")]).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("x-maglev-generation: 1"), "{body}");
        }
    }

    #[tokio::test]
    async fn test_handoff_headers_reach_new_primary() {
        let upstream_port = spawn_upstream().await;
        let router = Arc::new(VersionedRouter::new(5));
        // Both identifiers reach the same upstream, so either can be primary.
        router.add_generation(
            Generation(1),
            build(vec![Backend::new("127.0.0.1")], 7).unwrap(),
        );
        router.add_generation(
            Generation(2),
            build(vec![Backend::new("localhost"), Backend::new("127.0.0.1")], 7).unwrap(),
        );

        let room = (0..100)
            .map(|i| format!("room-{i}"))
            .find(|room| {
                let result = router.route(room, Some("1"), 2, 7).unwrap();
                result.state() == RouteState::Migrating
            })
            .expect("some room moves to the new backend");

        let routing = RoutingHandle::Versioned {
            router,
            replica_count: 2,
            max_jumps: 7,
        };
        let addr = spawn_proxy(routing, upstream_port).await;

        let (status, body) = fetch(addr, &room, &[(HEADER_GENERATION, "1")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("x-maglev-generation: 2"), "{body}");
        assert!(body.contains("x-maglev-replication-peers: 127.0.0.1"), "{body}");
        assert!(body.contains("x-maglev-previous-primary: 127.0.0.1"), "{body}");
        assert!(body.contains("x-maglev-previous-peers"), "{body}");

        // Stable and fresh requests carry no previous-owner headers, even forged ones.
        for token in [Some("2"), None] {
            let mut extra = vec![
                (HEADER_PREVIOUS_PRIMARY, "10.9.9.9"),
                (HEADER_PREVIOUS_PEERS, "10.9.9.8"),
            ];
            if let Some(token) = token {
                extra.push((HEADER_GENERATION, token));
            }
            let (status, body) = fetch(addr, &room, &extra).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("x-maglev-generation: 2"), "{body}");
            assert!(!body.contains("previous"), "{body}");
        }
    }

    #[tokio::test]
    async fn test_empty_router_is_unavailable() {
        let routing = RoutingHandle::Versioned {
            router: Arc::new(VersionedRouter::new(5)),
            replica_count: 1,
            max_jumps: 5,
        };
        let addr = spawn_proxy(routing, 1).await;

        let (status, _) = fetch(addr, "lobby", &[]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
