//! Locked maps shared by the issuing thread and the workers.
//!
//! - [`HandleRegistry`] maps a [`Handle`](crate::Handle) to its job.
//! - [`CallbackRegistry`] tracks notifications that are on their way to the
//!   issuing loop, so cancellation can invalidate them in flight.
//!
//! Lock order: handle registry, then job lock, then callback registry.

mod callbacks;
mod handles;

pub(crate) use callbacks::{CallbackId, CallbackRegistry, CallbackStatus};
pub(crate) use handles::{HandleRegistry, JobMap};
