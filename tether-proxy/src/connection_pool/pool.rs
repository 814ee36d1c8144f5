//! Lock-free hot pool implementation using DashMap and SegQueue.

use std::sync::Arc;

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::ProxyError;

/// A lock-free pool caching HTTP/1.1 connections per backend authority.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPool {
    /// Maps a `host:port` authority to a lock-free queue of idle senders.
    idle_connections: Arc<DashMap<String, Arc<SegQueue<SendRequest<Incoming>>>>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to pop an open connection sender for the given authority.
    ///
    /// An authority whose queue runs dry is dropped from the map, so
    /// backends that left the table do not linger.
    pub fn try_pop(&self, authority: &str) -> Option<SendRequest<Incoming>> {
        let queue = self.idle_connections.get(authority)?.value().clone();
        while let Some(sender) = queue.pop() {
            // Not closed yet; the caller still awaits `ready()` before use.
            if !sender.is_closed() {
                return Some(sender);
            }
        }
        self.idle_connections
            .remove_if(authority, |_, queue| queue.is_empty());
        None
    }

    /// Pushes an idle sender back into the pool for reuse.
    pub fn push(&self, authority: String, sender: SendRequest<Incoming>) {
        if sender.is_closed() {
            return;
        }

        let queue = self
            .idle_connections
            .entry(authority)
            .or_insert_with(|| Arc::new(SegQueue::new()))
            .value()
            .clone();

        queue.push(sender);
    }

    /// Returns a ready sender for `authority`, dialing a new connection if none is pooled.
    pub async fn checkout(&self, authority: &str) -> Result<SendRequest<Incoming>, ProxyError> {
        while let Some(mut sender) = self.try_pop(authority) {
            if sender.ready().await.is_ok() {
                return Ok(sender);
            }
        }
        connect(authority).await
    }

    /// Returns `sender` to the pool once its in-flight exchange completes.
    pub fn release(&self, authority: String, mut sender: SendRequest<Incoming>) {
        let pool = self.clone();
        tokio::spawn(async move {
            if sender.ready().await.is_ok() {
                pool.push(authority, sender);
            }
        });
    }
}

async fn connect(authority: &str) -> Result<SendRequest<Incoming>, ProxyError> {
    let stream = TcpStream::connect(authority).await?;
    let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;

    let authority = authority.to_string();
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!(%authority, error = %err, "upstream connection closed");
        }
    });

    Ok(sender)
}
