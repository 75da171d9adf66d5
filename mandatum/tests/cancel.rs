use mandatum::backend::XferProgress;
use mandatum::testing::{BackendCall, MemoryBackend};
use mandatum::{
    Backend, CancellationToken, DirectoryHandle, EngineBuilder, FileHandle, FileInfo,
    FileInfoOptions, FindDirectoryKind, Handle, OpenMode, PRIORITY_DEFAULT, SetFileInfoMask, Uri,
    VfsError, VfsResult, XferRequest,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn uri(path: &str) -> Uri {
    Uri::new("mem", path)
}

/// Spins until `done` holds, without dispatching anything.
fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;

    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }

    done()
}

#[mandatum::test(max_threads = 1, min_threads = 1)]
fn cancel_before_start_never_calls_back() {
    backend.insert_file("/a", "a");
    backend.pause(BackendCall::GetFileInfo);

    engine
        .get_file_info(vec![uri("/a")], FileInfoOptions::default(), PRIORITY_DEFAULT, |_, _| {})
        .unwrap();
    assert!(backend.wait_until_blocked(BackendCall::GetFileInfo, TIMEOUT));

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(engine.job_count(), 2);
    engine.cancel(handle);
    assert_eq!(engine.job_count(), 1);

    assert!(matches!(
        engine.read(handle, 1, |_, _| {}),
        Err(VfsError::InvalidHandle(h)) if h == handle
    ));

    backend.resume(BackendCall::GetFileInfo);
    assert!(event_loop.run_until(TIMEOUT, || {
        engine.job_count() == 0 && engine.active_job_count() == 0
    }));
    event_loop.dispatch_pending();

    assert!(!called.load(Ordering::SeqCst));
    assert!(
        backend
            .calls()
            .iter()
            .all(|record| record.call != BackendCall::Open)
    );
}

#[mandatum::test]
fn cancel_after_open_completed_closes_the_file() {
    backend.insert_file("/a", "a");

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    // The worker finished; its notification waits on the loop.
    assert!(wait_for(|| {
        engine.active_job_count() == 0 && backend.open_files() == 1
    }));

    engine.cancel(handle);

    assert!(event_loop.run_until(TIMEOUT, || {
        engine.job_count() == 0 && backend.close_count() == 1
    }));
    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(backend.open_files(), 0);
}

#[mandatum::test]
fn cancel_while_paused_open_fails_quietly() {
    backend.insert_file("/a", "a");
    backend.pause(BackendCall::Open);

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(backend.wait_until_blocked(BackendCall::Open, TIMEOUT));
    engine.cancel(handle);

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(backend.open_files(), 0);
}

#[mandatum::test]
fn cancelled_read_keeps_the_handle_open() {
    backend.insert_file("/a", "abc");

    let opened = Arc::new(AtomicBool::new(false));
    let flag = opened.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, result| {
            result.unwrap();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    assert!(event_loop.run_until(TIMEOUT, || opened.load(Ordering::SeqCst)));

    backend.pause(BackendCall::Read);

    let read_called = Arc::new(AtomicBool::new(false));
    let flag = read_called.clone();
    engine
        .read(handle, 3, move |_, _| flag.store(true, Ordering::SeqCst))
        .unwrap();

    assert!(backend.wait_until_blocked(BackendCall::Read, TIMEOUT));
    engine.cancel(handle);
    backend.resume(BackendCall::Read);

    assert!(wait_for(|| engine.active_job_count() == 0));
    assert_eq!(engine.job_count(), 1);

    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();
    engine
        .close(handle, move |_, result| {
            result.unwrap();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || closed.load(Ordering::SeqCst)));
    assert!(!read_called.load(Ordering::SeqCst));
    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    assert_eq!(backend.open_files(), 0);
}

#[mandatum::test]
fn cancelling_a_finished_job_does_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handle = engine
        .get_file_info(vec![uri("/")], FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || {
        calls.load(Ordering::SeqCst) == 1 && engine.job_count() == 0
    }));

    engine.cancel(handle);
    engine.cancel(handle);
    event_loop.dispatch_timeout(Duration::from_millis(20));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[mandatum::test(max_threads = 4)]
fn every_job_calls_back_at_most_once() {
    backend.insert_file("/a", "a");
    backend.set_latency(Duration::from_millis(1));

    let seen: Arc<Mutex<HashMap<Handle, usize>>> = Arc::default();
    let mut handles = Vec::new();

    for i in 0..40 {
        let seen = seen.clone();
        let handle = engine
            .get_file_info(
                vec![uri("/a"), uri("/missing")],
                FileInfoOptions::default(),
                PRIORITY_DEFAULT,
                move |handle, _| {
                    *seen.lock().unwrap().entry(handle).or_insert(0) += 1;
                },
            )
            .unwrap();

        if i % 3 == 0 {
            engine.cancel(handle);
        }
        handles.push(handle);
    }

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    let seen = seen.lock().unwrap();
    assert!(seen.values().all(|count| *count == 1));
    for (i, handle) in handles.iter().enumerate() {
        if i % 3 == 0 {
            assert!(!seen.contains_key(handle));
        }
    }
}

#[mandatum::test]
fn panicking_backend_call_discards_the_job() {
    backend.insert_file("/a", "a");
    backend.panic_on(BackendCall::Open);

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    assert!(!called.load(Ordering::SeqCst));

    // The pool survives.
    let opened = Arc::new(AtomicBool::new(false));
    let flag = opened.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, result| {
            result.unwrap();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || opened.load(Ordering::SeqCst)));
    engine.close(handle, |_, _| {}).unwrap();
    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
}

#[mandatum::test]
fn panicking_read_still_closes_the_file() {
    backend.insert_file("/a", "abc");

    let opened = Arc::new(Mutex::new(None));
    let slot = opened.clone();
    engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |handle, result| {
            result.unwrap();
            *slot.lock().unwrap() = Some(handle);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || opened.lock().unwrap().is_some()));
    let handle = opened.lock().unwrap().take().unwrap();

    backend.panic_on(BackendCall::Read);

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    engine
        .read(handle, 2, move |_, _| flag.store(true, Ordering::SeqCst))
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(backend.open_files(), 0);
    assert_eq!(backend.close_count(), 1);
}

/// A backend whose `open` ignores cancellation and waits to be released.
struct StubbornOpen {
    inner: MemoryBackend,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Backend for StubbornOpen {
    fn open(
        &self,
        uri: &Uri,
        mode: OpenMode,
        _token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();

        self.inner.open(uri, mode, &CancellationToken::new())
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
        self.inner.get_file_info(uri, options, token)
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
fn cancel_during_open_closes_what_it_opened() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();

    let backend = Arc::new(StubbornOpen {
        inner: MemoryBackend::new(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    backend.inner.insert_file("/a", "a");

    let (engine, event_loop) = EngineBuilder::new().build(backend.clone());

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    entered_rx.recv_timeout(TIMEOUT).unwrap();
    engine.cancel(handle);
    release_tx.send(()).unwrap();

    assert!(event_loop.run_until(TIMEOUT, || {
        engine.job_count() == 0 && backend.inner.close_count() == 1
    }));
    event_loop.dispatch_pending();

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(backend.inner.open_files(), 0);
}
