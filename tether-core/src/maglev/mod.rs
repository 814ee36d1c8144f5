//! Maglev consistent hashing.
//!
//! Based on Google's Maglev paper: <https://research.google/pubs/pub44824/>

pub mod builder;
pub mod table;

pub use builder::{build, BuildError, TableBuilder, DEFAULT_TABLE_SIZE};
pub use table::Table;
