//! Domain models shared by the table builder and the routers.

pub mod backend;
pub mod generation;

pub use backend::{join_ids, Backend};
pub use generation::{Generation, ParseGenerationError};
