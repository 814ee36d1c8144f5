//! Tether Core functionality.
//!
//! This crate contains the domain models, Maglev consistent-hash tables and
//! generation-versioned routing primitives that power the Tether
//! connection-affinity proxy.
//!
//! Data flows one way: a backend snapshot is built into an immutable
//! [`Table`], installed into a [`VersionedRouter`] under a new
//! [`Generation`], and read by routing decisions that compare at most two
//! tables: the current one and the one the client last saw.

pub mod discovery;
pub mod domain;
pub mod hash;
pub mod maglev;
pub mod routing;

pub use discovery::{BackendSource, ChangeDetector, GenerationUpdater, SnapshotStream};
pub use domain::{Backend, Generation};
pub use maglev::{BuildError, Table, TableBuilder, DEFAULT_TABLE_SIZE};
pub use routing::{
    Decision, Dispatcher, KeyExtractor, RouteError, RouteResult, RouteState, RoutingHandle,
    VersionedRouter,
};
