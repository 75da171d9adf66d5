//! # Mandatum
//!
//! **Mandatum** is the asynchronous operation engine of a virtual filesystem
//! client. Callers issue file operations without blocking; the engine runs
//! them on a bounded pool of worker threads against a storage [`Backend`]
//! and delivers every result as a callback on the caller's own
//! [`EventLoop`].
//!
//! It offers:
//!
//! - **Prioritized worker pool**: jobs wait in a priority queue, at most
//!   `job_limit` run at once, threads are spawned on demand
//! - **Handle continuations**: one job follows a file from open through
//!   reads, writes and seeks to close, never running two of them at once
//! - **Cooperative cancellation**: a cancelled job never calls back, and
//!   results already in flight are discarded
//! - **Synchronous notifications**: xfer progress and backend requests wait
//!   for the loop's answer
//! - **Channels**: a file streamed through a pipe instead of read in calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mandatum::testing::MemoryBackend;
//! use mandatum::{EngineBuilder, OpenMode, PRIORITY_DEFAULT, Uri};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert_file("/hello.txt", "hello");
//!
//! let (engine, event_loop) = EngineBuilder::new().build(backend);
//!
//! let reader = engine.clone();
//! engine.open(Uri::parse("mem:///hello.txt")?, OpenMode::READ, PRIORITY_DEFAULT, move |handle, result| {
//!     result.expect("open failed");
//!     reader.read(handle, 64, |_, data| println!("{:?}", data)).unwrap();
//! })?;
//!
//! event_loop.run_until(Duration::from_secs(1), || engine.job_count() == 1);
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: the storage traits and the values they exchange
//! - [`testing`]: an in-memory backend with hooks for tests
//!
//! ## Getting Started
//!
//! Add Mandatum to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! mandatum = { git = "https://github.com/Nebula-ecosystem/Mandatum", package = "mandatum" }
//! ```

mod cancel;
mod engine;
mod error;
mod job;
mod notify;
mod pool;
mod registry;
mod stream;

pub mod backend;
pub mod testing;

pub use backend::{
    Backend, DirectoryHandle, FileHandle, FileInfo, FileInfoOptions, FileInfoResult, FileType,
    FindDirectoryKind, FindDirectoryResult, OpenMode, SetFileInfoMask, Uri, XferErrorMode,
    XferOptions, XferOverwriteMode, XferPhase, XferProgressInfo, XferProgressStatus, XferReply,
    XferRequest,
};
pub use cancel::CancellationToken;
pub use engine::{Engine, EngineBuilder, request_on_loop};
pub use error::{BackendError, ErrorKind, VfsError, VfsResult};
pub use job::{Handle, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};
pub use notify::EventLoop;
pub use stream::Channel;

pub use mandatum_macros::*;
