//! Jobs and the operations they carry.

mod core;
mod execute;
mod handle;
mod op;
mod state;

pub use handle::{Handle, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};

pub(crate) use core::{Completion, Job, JobInner, completion};
pub(crate) use execute::Execution;
pub(crate) use handle::validate_priority;
pub(crate) use op::{
    ChannelCallback, CloseCallback, FileControlCallback, FindDirectoryCallback,
    GetFileInfoCallback, LoadDirectoryCallback, Op, OpKind, OpenCallback, ReadCallback,
    SeekCallback, SetFileInfoCallback, WriteCallback, XferCallback,
};
pub(crate) use state::JobState;
