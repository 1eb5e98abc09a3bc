//! Backend abstraction layer
//!
//! Provides the common trait and types that the wgpu backend and the
//! recording dummy backend implement.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::DummyBackend;
pub use traits::*;
pub use types::*;
