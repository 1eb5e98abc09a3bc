//! Resource management
//!
//! Meshes and materials for the planner geometry.

mod material;
mod mesh;

pub use material::*;
pub use mesh::*;
