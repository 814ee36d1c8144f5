//! Single-table dispatcher without generation tracking.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::Backend;
use crate::maglev::Table;

/// A lock-free dispatcher mapping keys to backends through one Maglev table.
///
/// Uses `ArcSwap` to allow atomic, zero-downtime table replacement without
/// acquiring read locks on the hot path (like `RwLock` would).
#[derive(Debug)]
pub struct Dispatcher {
    table: ArcSwap<Table>,
}

impl Dispatcher {
    /// Create a dispatcher serving the given table.
    pub fn new(table: Table) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Select the backend owning `key` in the current table.
    pub fn route(&self, key: &str) -> Backend {
        let backend = self.table.load().lookup(key).clone();
        debug!(key, backend = %backend.id, "routing request");
        backend
    }

    /// Atomically replace the table (e.g., after the backend set changed).
    pub fn update_table(&self, table: Table) {
        let new_table = Arc::new(table);
        let old_table = self.table.swap(Arc::clone(&new_table));
        info!(
            old_table = %old_table,
            new_table = %new_table,
            "updated maglev table"
        );
    }

    /// Retrieve a snapshot of the current table.
    pub fn snapshot(&self) -> Arc<Table> {
        self.table.load_full()
    }
}

/// A shared reference to the lock-free dispatcher.
pub type SharedDispatcher = Arc<Dispatcher>;
