//! A routing handle over either router flavor.

use crate::domain::Backend;
use crate::routing::dispatcher::SharedDispatcher;
use crate::routing::versioned::{RouteError, RouteResult, SharedVersionedRouter};

/// The live router a proxy or control plane reads from.
#[derive(Debug, Clone)]
pub enum RoutingHandle {
    /// Generation-versioned routing with hand-off detection.
    Versioned {
        /// The live router
        router: SharedVersionedRouter,
        /// Replicas requested per route
        replica_count: usize,
        /// Probe budget per route
        max_jumps: usize,
    },
    /// Single-table routing without generations.
    Simple(SharedDispatcher),
}

/// The outcome of routing one request through a [`RoutingHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Decision from the versioned router
    Versioned(RouteResult),
    /// Backend chosen by the simple dispatcher
    Simple(Backend),
}

impl Decision {
    /// The backend the request should be forwarded to.
    pub fn primary(&self) -> &Backend {
        match self {
            Self::Versioned(result) => &result.primary,
            Self::Simple(backend) => backend,
        }
    }

    /// Hand-off headers to attach upstream; none in simple mode.
    pub fn handoff_headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Versioned(result) => result.handoff_headers(),
            Self::Simple(_) => Vec::new(),
        }
    }
}

impl RoutingHandle {
    /// Route `key`. The generation token is ignored in simple mode.
    pub fn route(&self, key: &str, client_token: Option<&str>) -> Result<Decision, RouteError> {
        match self {
            Self::Versioned {
                router,
                replica_count,
                max_jumps,
            } => router
                .route(key, client_token, *replica_count, *max_jumps)
                .map(Decision::Versioned),
            Self::Simple(dispatcher) => Ok(Decision::Simple(dispatcher.route(key))),
        }
    }
}
