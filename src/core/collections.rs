//! Collection aliases and acceleration structures shared by the pipeline stages.

mod aliases;
pub mod spatial_hash_grid;

pub use aliases::*;
pub use spatial_hash_grid::HashGridIndex;
