//! Boundary with backend-set producers.
//!
//! Producers deliver full-replacement snapshots of the backend set. Each
//! accepted snapshot becomes one table and one generation.

mod updater;

use std::pin::Pin;

use tokio_stream::Stream;

use crate::domain::Backend;

pub use updater::GenerationUpdater;

/// A lazily produced sequence of full backend-set snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Vec<Backend>> + Send + 'static>>;

/// Produces backend-set snapshots whenever membership changes.
pub trait BackendSource: Send + Sync {
    /// Start a new sequence of snapshots.
    ///
    /// Every call restarts from the producer's current view. The stream may
    /// be finite (a static list) or run for the lifetime of the process.
    fn snapshots(&self) -> SnapshotStream;
}

/// Suppresses snapshots identical to the previous one.
///
/// Comparison ignores ordering: two snapshots listing the same backends
/// with the same failure domains in any order are equal.
#[derive(Debug, Default, Clone)]
pub struct ChangeDetector {
    last: Option<Vec<Backend>>,
}

impl ChangeDetector {
    /// Create a detector that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `backends`, returning true if it differs from the last snapshot.
    pub fn observe(&mut self, backends: &[Backend]) -> bool {
        let mut canonical = backends.to_vec();
        canonical.sort();
        canonical.dedup();

        if self.last.as_ref() == Some(&canonical) {
            return false;
        }
        self.last = Some(canonical);
        true
    }
}
