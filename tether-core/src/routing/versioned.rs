//! Generation-versioned routing with hand-off detection.
//!
//! The router retains a bounded history of tables keyed by generation. A
//! client presents the generation it was last routed under; the router
//! recomputes the key's primary under both that generation and the current
//! one and signals a hand-off when they differ. No per-key state is kept.

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{join_ids, Backend, Generation};
use crate::maglev::Table;

/// Reasons a routing decision cannot be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No generation has been installed yet.
    #[error("no routing generation installed")]
    NoGenerations,

    /// A replica count or probe budget of zero selects nothing.
    #[error("replica count and probe budget must both be positive")]
    EmptyReplicaSet,
}

/// How a request relates to the client's previous assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// No usable client generation; treated as a first request.
    Fresh,
    /// The client's primary is unchanged since its generation.
    Stable,
    /// The client's primary moved; the new primary must recover state.
    Migrating,
}

/// The outcome of one routing decision. Produced per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    /// Current primary backend for the key
    pub primary: Backend,
    /// Current replication peers, excluding the primary
    pub peers: Vec<Backend>,
    /// Primary under the client's generation, when a hand-off occurred
    pub previous_primary: Option<Backend>,
    /// Peers under the client's generation, when a hand-off occurred
    pub previous_peers: Vec<Backend>,
    /// Current generation
    pub generation: Generation,
    /// The client's generation, if it parsed and is still retained
    pub client_generation: Option<Generation>,
    /// True when the primary changed since the client's generation
    pub requires_recovery: bool,
}

impl RouteResult {
    /// Classify this decision.
    pub fn state(&self) -> RouteState {
        match (self.client_generation, self.requires_recovery) {
            (None, _) => RouteState::Fresh,
            (Some(_), false) => RouteState::Stable,
            (Some(_), true) => RouteState::Migrating,
        }
    }
}

/// Immutable snapshot of the retained generations, oldest first.
#[derive(Debug, Clone, Default)]
struct History {
    entries: VecDeque<(Generation, Arc<Table>)>,
    current: Option<Generation>,
}

impl History {
    fn get(&self, generation: Generation) -> Option<&Arc<Table>> {
        self.entries
            .iter()
            .find(|(g, _)| *g == generation)
            .map(|(_, table)| table)
    }

    fn current(&self) -> Option<(Generation, &Arc<Table>)> {
        let generation = self.current?;
        self.get(generation).map(|table| (generation, table))
    }
}

/// Routes keys across a bounded history of Maglev tables.
///
/// Reads are lock-free: each call loads the current history snapshot,
/// clones the table references it needs and releases the snapshot before
/// any hashing. Writers publish a new snapshot with a read-copy-update, so
/// a reader never observes a half-spliced history. Tables evicted from the
/// history stay alive for as long as a reader still holds them.
#[derive(Debug)]
pub struct VersionedRouter {
    history: ArcSwap<History>,
    max_history: usize,
}

impl VersionedRouter {
    /// Create an empty router retaining at most `max_history` generations.
    ///
    /// A bound of zero is raised to one.
    pub fn new(max_history: usize) -> Self {
        Self {
            history: ArcSwap::from_pointee(History::default()),
            max_history: max_history.max(1),
        }
    }

    /// Maximum number of retained generations.
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Install `table` as the new current generation.
    ///
    /// Returns `false` without any effect if `generation` is already retained.
    /// When the history exceeds its bound the oldest generation is evicted.
    /// Generations are expected to increase, but this is not enforced.
    pub fn add_generation(&self, generation: Generation, table: impl Into<Arc<Table>>) -> bool {
        let table = table.into();
        let mut inserted = false;
        let mut evicted = Vec::new();

        self.history.rcu(|current| {
            evicted.clear();
            if current.get(generation).is_some() {
                inserted = false;
                return Arc::clone(current);
            }

            let mut next = History::clone(current);
            next.entries.push_back((generation, Arc::clone(&table)));
            next.current = Some(generation);
            while next.entries.len() > self.max_history {
                if let Some((old, _)) = next.entries.pop_front() {
                    evicted.push(old);
                }
            }
            inserted = true;
            Arc::new(next)
        });

        if inserted {
            info!(
                %generation,
                backends = %table,
                evicted = ?evicted,
                "installed routing generation"
            );
        } else {
            debug!(%generation, "generation already installed; ignoring");
        }
        inserted
    }

    /// The most recently installed generation.
    pub fn current_generation(&self) -> Option<Generation> {
        self.history.load().current
    }

    /// Retained generations, oldest first.
    pub fn generations(&self) -> Vec<Generation> {
        self.history.load().entries.iter().map(|(g, _)| *g).collect()
    }

    /// The table for a retained generation.
    pub fn table(&self, generation: Generation) -> Option<Arc<Table>> {
        self.history.load().get(generation).cloned()
    }

    /// The current generation together with its table.
    pub fn current(&self) -> Option<(Generation, Arc<Table>)> {
        let history = self.history.load();
        history
            .current()
            .map(|(generation, table)| (generation, Arc::clone(table)))
    }

    /// Number of retained generations.
    pub fn len(&self) -> usize {
        self.history.load().entries.len()
    }

    /// True before the first generation is installed.
    pub fn is_empty(&self) -> bool {
        self.history.load().entries.is_empty()
    }

    /// Route `key`, detecting whether its primary moved since the client's generation.
    ///
    /// `client_token` is the generation the client last saw, as sent on the
    /// wire. A missing, unparsable or no-longer-retained token is treated as
    /// a first request and never produces an error.
    pub fn route(
        &self,
        key: &str,
        client_token: Option<&str>,
        replica_count: usize,
        max_jumps: usize,
    ) -> Result<RouteResult, RouteError> {
        if replica_count == 0 || max_jumps == 0 {
            return Err(RouteError::EmptyReplicaSet);
        }

        let client_generation = client_token.and_then(parse_token);

        // Hold the snapshot only long enough to clone the tables we need.
        let (generation, current_table, client) = {
            let history = self.history.load();
            let (generation, table) = history.current().ok_or(RouteError::NoGenerations)?;
            let client = client_generation
                .and_then(|g| history.get(g).map(|table| (g, Arc::clone(table))));
            (generation, Arc::clone(table), client)
        };

        let (primary, peers) = replica_set(&current_table, key, replica_count, max_jumps)?;

        let Some((client_generation, client_table)) = client else {
            debug!(key, %generation, primary = %primary, "fresh route");
            return Ok(RouteResult {
                primary,
                peers,
                previous_primary: None,
                previous_peers: Vec::new(),
                generation,
                client_generation: None,
                requires_recovery: false,
            });
        };

        let (previous_primary, previous_peers) =
            replica_set(&client_table, key, replica_count, max_jumps)?;

        if previous_primary.id == primary.id {
            debug!(key, %generation, %client_generation, primary = %primary, "stable route");
            return Ok(RouteResult {
                primary,
                peers,
                previous_primary: None,
                previous_peers: Vec::new(),
                generation,
                client_generation: Some(client_generation),
                requires_recovery: false,
            });
        }

        info!(
            key,
            %generation,
            %client_generation,
            from = %previous_primary,
            to = %primary,
            previous_peers = %join_ids(&previous_peers),
            "primary handed off"
        );
        Ok(RouteResult {
            primary,
            peers,
            previous_primary: Some(previous_primary),
            previous_peers,
            generation,
            client_generation: Some(client_generation),
            requires_recovery: true,
        })
    }
}

/// A shared reference to the versioned router.
pub type SharedVersionedRouter = Arc<VersionedRouter>;

fn parse_token(token: &str) -> Option<Generation> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match token.parse() {
        Ok(generation) => Some(generation),
        Err(err) => {
            debug!(token, error = %err, "ignoring unparsable generation token");
            None
        }
    }
}

/// Domain-isolated replicas for `key`, split into primary and peers.
fn replica_set(
    table: &Table,
    key: &str,
    replica_count: usize,
    max_jumps: usize,
) -> Result<(Backend, Vec<Backend>), RouteError> {
    let mut replicas = table
        .lookup_n_with_domain_isolation(key, replica_count, max_jumps)
        .into_iter()
        .cloned();
    let primary = replicas.next().ok_or(RouteError::EmptyReplicaSet)?;
    Ok((primary, replicas.collect()))
}
