//! Upstream connection reuse.

mod pool;

pub use pool::ConnectionPool;
