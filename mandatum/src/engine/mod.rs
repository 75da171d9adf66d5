//! The public face of the crate.
//!
//! [`Engine`] starts operations and continues them, [`EngineBuilder`]
//! configures the worker pool. Backends running on a worker can reach the
//! issuing loop through [`request_on_loop`].

mod builder;
mod context;
mod core;
mod shared;

pub use builder::EngineBuilder;
pub use context::request_on_loop;
pub use core::Engine;

pub(crate) use shared::{Shared, close_orphan};
