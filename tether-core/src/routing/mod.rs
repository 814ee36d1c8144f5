//! Routing primitives: the simple dispatcher and the versioned router.

pub mod dispatcher;
pub mod handle;
pub mod headers;
pub mod key;
pub mod versioned;

pub use dispatcher::{Dispatcher, SharedDispatcher};
pub use handle::{Decision, RoutingHandle};
pub use key::KeyExtractor;
pub use versioned::{RouteError, RouteResult, RouteState, SharedVersionedRouter, VersionedRouter};
