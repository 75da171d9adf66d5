use mandatum::backend::XferProgress;
use mandatum::testing::MemoryBackend;
use mandatum::{
    Backend, CancellationToken, DirectoryHandle, EngineBuilder, FileHandle, FileInfo,
    FileInfoOptions, FindDirectoryKind, OpenMode, PRIORITY_DEFAULT, SetFileInfoMask, Uri,
    VfsError, VfsResult, XferRequest, request_on_loop,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn uri(path: &str) -> Uri {
    Uri::new("mem", path)
}

/// Asks the issuing loop for the MIME type of every file it describes.
struct AskingBackend {
    inner: MemoryBackend,
    asked_from: Mutex<Vec<ThreadId>>,
}

impl Backend for AskingBackend {
    fn open(
        &self,
        uri: &Uri,
        mode: OpenMode,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>> {
        self.inner.open(uri, mode, token)
    }

    fn create(
        &self,
        uri: &Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>> {
        self.inner.create(uri, mode, exclusive, permissions, token)
    }

    fn create_symbolic_link(
        &self,
        uri: &Uri,
        target: &str,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        self.inner.create_symbolic_link(uri, target, token)
    }

    fn get_file_info(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<FileInfo> {
        let mut info = self.inner.get_file_info(uri, options, token)?;

        let (loop_thread, mime_type) = request_on_loop(|| {
            (thread::current().id(), "application/x-asked".to_string())
        })?;

        self.asked_from.lock().unwrap().push(loop_thread);
        info.mime_type = Some(mime_type);

        Ok(info)
    }

    fn set_file_info(
        &self,
        uri: &Uri,
        info: &FileInfo,
        mask: SetFileInfoMask,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        self.inner.set_file_info(uri, info, mask, token)
    }

    fn open_directory(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn DirectoryHandle>> {
        self.inner.open_directory(uri, options, token)
    }

    fn find_directory(
        &self,
        near: &Uri,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Uri> {
        self.inner
            .find_directory(near, kind, create_if_needed, find_if_needed, permissions, token)
    }

    fn xfer(
        &self,
        request: &XferRequest,
        progress: &mut XferProgress<'_>,
        token: &CancellationToken,
    ) -> VfsResult<()> {
        self.inner.xfer(request, progress, token)
    }
}

#[test]
fn backend_request_runs_on_the_loop_thread() {
    let _ = env_logger::builder().is_test(true).try_init();

    let backend = Arc::new(AskingBackend {
        inner: MemoryBackend::new(),
        asked_from: Mutex::new(Vec::new()),
    });
    backend.inner.insert_file("/a", "a");
    backend.inner.insert_file("/b", "b");

    let (engine, event_loop) = EngineBuilder::new().build(backend.clone());

    let answers = Arc::new(Mutex::new(None));
    let slot = answers.clone();
    engine
        .get_file_info(vec![uri("/a"), uri("/b")], FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, results| {
            *slot.lock().unwrap() = Some(results);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || answers.lock().unwrap().is_some()));

    let answers = answers.lock().unwrap().take().unwrap();
    let mime_types: Vec<Option<String>> = answers
        .into_iter()
        .map(|answer| answer.result.unwrap().mime_type)
        .collect();

    assert_eq!(
        mime_types,
        vec![Some("application/x-asked".to_string()); 2]
    );
    assert_eq!(
        *backend.asked_from.lock().unwrap(),
        vec![thread::current().id(); 2]
    );
}

#[test]
fn cancelled_job_gets_no_answer() {
    let _ = env_logger::builder().is_test(true).try_init();

    let backend = Arc::new(AskingBackend {
        inner: MemoryBackend::new(),
        asked_from: Mutex::new(Vec::new()),
    });
    backend.inner.insert_file("/a", "a");

    let (engine, event_loop) = EngineBuilder::new().build(backend.clone());

    let answers = Arc::new(Mutex::new(None));
    let slot = answers.clone();
    let handle = engine
        .get_file_info(vec![uri("/a")], FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, results| {
            *slot.lock().unwrap() = Some(results);
        })
        .unwrap();

    // The worker now waits for the loop; cancel before serving it.
    let deadline = std::time::Instant::now() + TIMEOUT;
    while backend.inner.calls().is_empty() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    engine.cancel(handle);

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    assert!(answers.lock().unwrap().is_none());
    assert!(backend.asked_from.lock().unwrap().is_empty());
}

#[test]
fn request_outside_a_job_is_refused() {
    let result = request_on_loop(|| 1);

    assert!(matches!(result, Err(VfsError::BadParameters(_))));
}
