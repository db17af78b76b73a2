//! Stock backends.
//!
//! Backends implement [`crate::Backend`] for different storage kinds.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
