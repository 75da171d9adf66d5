//! Delivery of results from worker threads to the issuing loop.
//!
//! Workers push [`NotifyResult`]s through a [`Notifier`]; the issuing thread
//! pulls them from its [`EventLoop`] and runs the user callbacks. Delivery is
//! either:
//! - oneway: the worker queues the result and moves on, or
//! - synchronous: the worker waits for the loop to run the callback and reads
//!   back its [`Reply`] (xfer progress, channel handoff, backend requests).

mod channel;
mod event_loop;
mod result;

pub use event_loop::EventLoop;

pub(crate) use channel::Notifier;
pub(crate) use result::{NotifyResult, Payload, Reply};
