use std::fs::File;
use std::io::{self, Read, Write};

#[cfg(unix)]
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

/// Consumer end of a channel-style open or create.
///
/// For a read channel the bytes of the file arrive here until end of file;
/// for a write channel everything written here goes to the file. Dropping
/// the channel closes the pipe, which ends the transfer.
#[derive(Debug)]
pub struct Channel {
    file: File,
}

impl Channel {
    pub(crate) fn new(file: File) -> Self {
        Self { file }
    }

    /// Unwraps the underlying pipe end.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for Channel {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.file.read(buffer)
    }
}

impl Write for Channel {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.file.write(buffer)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(unix)]
impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(unix)]
impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
