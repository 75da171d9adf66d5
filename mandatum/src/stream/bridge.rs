use super::DEFAULT_BUFFER_SIZE;
use super::pipe::sys_set_nonblocking;
use crate::backend::FileHandle;
use crate::cancel::CancellationToken;
use crate::error::{BackendError, VfsError, VfsResult};

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

/// Pumps a backend file into the consumer's pipe until end of file.
///
/// `pipe` is the non-blocking write end. When the consumer is slower than
/// the backend, unwritten bytes are kept and the buffer doubles each time it
/// is more than half full, so backend reads never wait for the consumer.
/// Once the backend reports end of file the pipe goes back to blocking mode
/// and the remaining bytes are flushed.
pub(crate) fn serve_read(
    resource: &mut dyn FileHandle,
    mut pipe: File,
    block_size: usize,
    token: &CancellationToken,
) -> VfsResult<()> {
    let mut buffer = vec![0u8; block_size];
    let mut filled = 0;

    'read: loop {
        let want = block_size.min(buffer.len() - filled);

        let bytes_read = match resource.read(&mut buffer[filled..filled + want], token) {
            Ok(n) => n,
            Err(VfsError::Eof) => 0,
            Err(VfsError::Interrupted) => continue,
            Err(e) => return Err(e),
        };

        filled += bytes_read;

        if filled == 0 {
            return Ok(());
        }

        token.check()?;

        let mut written = 0;
        while written < filled {
            match pipe.write(&buffer[written..filled]) {
                Ok(0) => return Ok(()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    token.check()?;

                    if bytes_read == 0 {
                        // Nothing more to read: wait for the consumer instead.
                        sys_set_nonblocking(pipe.as_raw_fd(), false)?;
                        continue;
                    }

                    buffer.copy_within(written..filled, 0);
                    filled -= written;

                    if filled * 2 > buffer.len() {
                        let grown = buffer.len() * 2;
                        buffer.resize(grown, 0);
                    }

                    continue 'read;
                }
                Err(e) => return Err(e.into()),
            }

            token.check()?;
        }

        filled = 0;
    }
}

/// Pumps everything the producer writes into the pipe to the backend file.
///
/// Returns when the producer closes its end or any side fails.
pub(crate) fn serve_write(
    resource: &mut dyn FileHandle,
    mut pipe: File,
    token: &CancellationToken,
) -> VfsResult<()> {
    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];

    loop {
        token.check()?;

        let count = match pipe.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let mut chunk = &buffer[..count];
        while !chunk.is_empty() {
            match resource.write(chunk, token) {
                Ok(0) => {
                    return Err(BackendError::Other("backend accepted no bytes".into()).into());
                }
                Ok(n) => chunk = &chunk[n..],
                Err(VfsError::Interrupted) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
