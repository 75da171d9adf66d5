//! Test collaborators.
//!
//! [`MemoryBackend`] is a complete in-memory [`Backend`](crate::backend::Backend)
//! with hooks to pause, slow down, break and observe individual calls. It
//! is what `#[mandatum::test]` wires into every engine it builds.

mod files;
mod memory;
mod probe;

pub use files::{FILE_CONTROL_SIZE, FILE_CONTROL_TRUNCATE};
pub use memory::MemoryBackend;
pub use probe::{BackendCall, CallRecord};
