//! Tether Proxy Engine
//!
//! The Tokio async engine that watches the backend set, keeps the Maglev
//! router current and forwards each request to the backend owning its key.

#![deny(missing_docs)]

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tether_core::{
    Backend, Dispatcher, GenerationUpdater, RoutingHandle, SnapshotStream, TableBuilder,
    VersionedRouter,
};

mod config;
mod connection_pool;
mod discovery;
mod error;
mod proxy;
mod server;
mod tls;

use config::{Config, RouterMode};
use error::ProxyError;
use proxy::{HandoffProxy, HeaderKey};

/// The primary entrypoint for the Tether reverse proxy.
///
/// Waits for the first usable backend snapshot before accepting traffic, so
/// the router is never empty once the listener is bound.
#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    info!(mode = ?config.mode, listen = %config.listen_addr(), "starting Tether proxy");

    let source = discovery::from_config(&config)?;
    let mut snapshots = source.snapshots();
    let builder = TableBuilder::new(config.table_size);

    let routing = match config.mode {
        RouterMode::Versioned => {
            let router = Arc::new(VersionedRouter::new(config.max_history));
            let mut updater = GenerationUpdater::new(Arc::clone(&router), builder);
            loop {
                let backends = next_snapshot(&mut snapshots).await?;
                if updater.apply(backends).is_ok() {
                    break;
                }
            }
            tokio::spawn(updater.run(snapshots));
            RoutingHandle::Versioned {
                router,
                replica_count: config.replica_count,
                max_jumps: config.max_jumps,
            }
        }
        RouterMode::Simple => {
            let table = loop {
                let backends = next_snapshot(&mut snapshots).await?;
                match builder.build(backends) {
                    Ok(table) => break table,
                    Err(err) => warn!(error = %err, "rejected initial backend snapshot"),
                }
            };
            let dispatcher = Arc::new(Dispatcher::new(table));
            tokio::spawn(refresh_dispatcher(
                Arc::clone(&dispatcher),
                builder,
                snapshots,
            ));
            RoutingHandle::Simple(dispatcher)
        }
    };

    if let Some(path) = config.admin_socket.clone() {
        let handle = routing.clone();
        tokio::spawn(async move {
            if let Err(err) = tether_admin::serve(&path, handle).await {
                error!(path = %path.display(), error = %err, "admin control plane stopped");
            }
        });
    }

    let tls_acceptor = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => Some(tls::acceptor(cert, key)?),
        _ => None,
    };

    let proxy = Arc::new(HandoffProxy::new(
        routing,
        HeaderKey::new(config.route_header.clone()),
        config.dest_port,
    ));
    let listener = TcpListener::bind(config.listen_addr()).await?;

    // Runs until accepting fails.
    let result = server::start_server(listener, tls_acceptor, proxy).await;
    if let Err(err) = &result {
        error!(error = %err, "server failed");
    }
    info!("shutting down");
    result
}

async fn next_snapshot(snapshots: &mut SnapshotStream) -> Result<Vec<Backend>, ProxyError> {
    snapshots.next().await.ok_or(ProxyError::SourceEnded)
}

async fn refresh_dispatcher(
    dispatcher: Arc<Dispatcher>,
    builder: TableBuilder,
    mut snapshots: SnapshotStream,
) {
    while let Some(backends) = snapshots.next().await {
        match builder.build(backends) {
            Ok(table) => dispatcher.update_table(table),
            Err(err) => warn!(error = %err, "rejected backend snapshot; keeping current table"),
        }
    }
    info!("backend snapshot stream ended");
}
