use super::memory::Store;
use super::probe::BackendCall;
use crate::backend::{DirectoryHandle, FileHandle, FileInfo, OpenMode};
use crate::cancel::CancellationToken;
use crate::error::{BackendError, VfsError, VfsResult};

use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// File-control operation answering the file size into a `u64`.
pub const FILE_CONTROL_SIZE: &str = "mem:size";

/// File-control operation truncating or zero-extending the file to the
/// `u64` it is given.
pub const FILE_CONTROL_TRUNCATE: &str = "mem:truncate";

/// An open file of a [`MemoryBackend`](super::MemoryBackend).
pub(crate) struct MemoryFile {
    store: Arc<Store>,
    path: String,
    data: Arc<Mutex<Vec<u8>>>,
    mode: OpenMode,
    position: u64,
}

impl MemoryFile {
    pub(crate) fn new(
        store: Arc<Store>,
        path: String,
        data: Arc<Mutex<Vec<u8>>>,
        mode: OpenMode,
    ) -> Self {
        store.opened.fetch_add(1, Ordering::SeqCst);

        Self {
            store,
            path,
            data,
            mode,
            position: 0,
        }
    }
}

impl FileHandle for MemoryFile {
    fn read(&mut self, buffer: &mut [u8], token: &CancellationToken) -> VfsResult<usize> {
        let _scope = self.store.probe.enter(BackendCall::Read, &self.path, token)?;

        if !self.mode.contains(OpenMode::READ) {
            return Err(BackendError::NotSupported(format!("{} not open for reading", self.path)).into());
        }

        token.check()?;

        let data = self.data.lock();
        let start = usize::try_from(self.position).unwrap_or(usize::MAX);

        if start >= data.len() {
            return Err(VfsError::Eof);
        }

        let count = buffer.len().min(data.len() - start);
        buffer[..count].copy_from_slice(&data[start..start + count]);
        self.position += count as u64;

        Ok(count)
    }

    fn write(&mut self, buffer: &[u8], token: &CancellationToken) -> VfsResult<usize> {
        let _scope = self.store.probe.enter(BackendCall::Write, &self.path, token)?;

        if !self.mode.contains(OpenMode::WRITE) {
            return Err(BackendError::NotSupported(format!("{} not open for writing", self.path)).into());
        }

        token.check()?;

        let mut data = self.data.lock();
        let start = self.position as usize;
        let end = start + buffer.len();

        if data.len() < end {
            data.resize(end, 0);
        }

        data[start..end].copy_from_slice(buffer);
        self.position = end as u64;

        Ok(buffer.len())
    }

    fn seek(&mut self, position: SeekFrom, token: &CancellationToken) -> VfsResult<u64> {
        let _scope = self.store.probe.enter(BackendCall::Seek, &self.path, token)?;

        let len = self.data.lock().len() as i128;
        let target = match position {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(delta) => len + delta as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
        };

        if target < 0 {
            return Err(VfsError::BadParameters(format!("seek before start of {}", self.path)));
        }

        self.position = target as u64;

        Ok(self.position)
    }

    fn file_control(
        &mut self,
        operation: &str,
        data: &mut (dyn Any + Send),
        token: &CancellationToken,
    ) -> VfsResult<()> {
        let _scope = self.store.probe.enter(BackendCall::FileControl, &self.path, token)?;

        let Some(value) = data.downcast_mut::<u64>() else {
            return Err(VfsError::BadParameters(format!("{operation} expects a u64")));
        };

        match operation {
            FILE_CONTROL_SIZE => {
                *value = self.data.lock().len() as u64;
                Ok(())
            }
            FILE_CONTROL_TRUNCATE => {
                self.data.lock().resize(*value as usize, 0);
                Ok(())
            }
            _ => Err(BackendError::NotSupported(operation.to_string()).into()),
        }
    }

    fn close(self: Box<Self>, token: &CancellationToken) -> VfsResult<()> {
        let _scope = self.store.probe.enter(BackendCall::Close, &self.path, token)?;
        self.store.closed.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// A directory listing snapshot taken at open time.
pub(crate) struct MemoryDirectory {
    store: Arc<Store>,
    path: String,
    entries: VecDeque<FileInfo>,
}

impl MemoryDirectory {
    pub(crate) fn new(store: Arc<Store>, path: String, entries: Vec<FileInfo>) -> Self {
        Self {
            store,
            path,
            entries: entries.into(),
        }
    }
}

impl DirectoryHandle for MemoryDirectory {
    fn read_next(&mut self, token: &CancellationToken) -> VfsResult<FileInfo> {
        let _scope = self
            .store
            .probe
            .enter(BackendCall::ReadDirectory, &self.path, token)?;

        self.entries.pop_front().ok_or(VfsError::Eof)
    }
}
