//! Geometric utility functions: vector norms, seed point generation and permutations.

pub mod norms;
pub mod point_generation;

pub use norms::*;
pub use point_generation::*;
