use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::discovery::SnapshotStream;
use crate::domain::{Backend, Generation};
use crate::maglev::{BuildError, TableBuilder};
use crate::routing::VersionedRouter;

/// Turns backend snapshots into installed router generations.
///
/// Tables are built entirely off to the side; the router is only touched
/// once a build has succeeded. A failed build leaves the router serving
/// whatever it already had and does not consume a generation id.
#[derive(Debug)]
pub struct GenerationUpdater {
    router: Arc<VersionedRouter>,
    builder: TableBuilder,
    next: Generation,
}

impl GenerationUpdater {
    /// Create an updater feeding `router`.
    ///
    /// Numbering continues after the router's current generation, or starts
    /// at 1 for an empty router.
    pub fn new(router: Arc<VersionedRouter>, builder: TableBuilder) -> Self {
        let next = router
            .current_generation()
            .map_or(Generation(1), Generation::next);
        Self {
            router,
            builder,
            next,
        }
    }

    /// The id the next successful build will be installed under.
    pub fn next_generation(&self) -> Generation {
        self.next
    }

    /// Build a table for `backends` and install it as the next generation.
    pub fn apply(&mut self, backends: Vec<Backend>) -> Result<Generation, BuildError> {
        let count = backends.len();
        let table = match self.builder.build(backends) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, backends = count, "rejected backend snapshot; keeping current table");
                return Err(err);
            }
        };

        let generation = self.next;
        self.router.add_generation(generation, table);
        self.next = generation.next();
        info!(%generation, backends = count, "updated maglev table");
        Ok(generation)
    }

    /// Apply every snapshot from `snapshots` until the stream ends.
    pub async fn run(mut self, mut snapshots: SnapshotStream) {
        while let Some(backends) = snapshots.next().await {
            // Failures are logged by `apply`; keep consuming.
            let _ = self.apply(backends);
        }
        info!("backend snapshot stream ended");
    }
}
