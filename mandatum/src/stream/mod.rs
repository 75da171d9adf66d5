//! Channel-style access to backend files.
//!
//! An "as channel" open or create hands the caller one end of a pipe and
//! keeps a worker busy moving bytes between the other end and the backend
//! resource until either side stops.

mod channel;

#[cfg(unix)]
mod bridge;
#[cfg(unix)]
mod pipe;

pub use channel::Channel;

use crate::backend::{FileHandle, OpenMode};
use crate::cancel::CancellationToken;
use crate::error::VfsResult;

use std::fs::File;
use std::io;

/// Buffer size used when the caller gives no block size hint.
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Which way bytes flow through a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Backend file → consumer.
    Read,

    /// Producer → backend file.
    Write,
}

impl Direction {
    /// Channels are one-way: exactly one of `READ` and `WRITE` must be set.
    pub(crate) fn from_mode(mode: OpenMode) -> Option<Direction> {
        match (mode.contains(OpenMode::READ), mode.contains(OpenMode::WRITE)) {
            (true, false) => Some(Direction::Read),
            (false, true) => Some(Direction::Write),
            _ => None,
        }
    }
}

/// Worker-side end of a channel.
pub(crate) struct Bridge {
    direction: Direction,
    pipe: File,
    block_size: usize,
}

impl Bridge {
    /// Creates the pipe and returns the bridge plus the consumer's channel.
    #[cfg(unix)]
    pub(crate) fn new(direction: Direction, advised_block_size: usize) -> io::Result<(Bridge, Channel)> {
        let (read, write) = pipe::sys_pipe()?;

        let (ours, theirs) = match direction {
            Direction::Read => {
                pipe::sys_set_nonblocking(std::os::fd::AsRawFd::as_raw_fd(&write), true)?;
                (write, read)
            }
            Direction::Write => (read, write),
        };

        let block_size = if advised_block_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            advised_block_size
        };

        let bridge = Bridge {
            direction,
            pipe: File::from(ours),
            block_size,
        };

        Ok((bridge, Channel::new(File::from(theirs))))
    }

    #[cfg(not(unix))]
    pub(crate) fn new(_direction: Direction, _advised_block_size: usize) -> io::Result<(Bridge, Channel)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "channels are not supported on this platform",
        ))
    }

    /// Moves bytes until end of file, a closed pipe, an error or cancellation.
    #[cfg(unix)]
    pub(crate) fn serve(self, resource: &mut dyn FileHandle, token: &CancellationToken) -> VfsResult<()> {
        match self.direction {
            Direction::Read => bridge::serve_read(resource, self.pipe, self.block_size, token),
            Direction::Write => bridge::serve_write(resource, self.pipe, token),
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn serve(self, _resource: &mut dyn FileHandle, _token: &CancellationToken) -> VfsResult<()> {
        let _ = (self.direction, self.pipe, self.block_size);
        Ok(())
    }
}
