use mandatum::testing::{BackendCall, MemoryBackend};
use mandatum::{EngineBuilder, FileInfoOptions, OpenMode, PRIORITY_DEFAULT, Uri, VfsError};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn uri(path: &str) -> Uri {
    Uri::new("mem", path)
}

#[mandatum::test(max_threads = 3, min_threads = 3)]
fn shutdown_waits_for_running_jobs_and_rejects_new_ones() {
    backend.insert_file("/a", "a");
    backend.pause(BackendCall::GetFileInfo);

    let results = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let results = results.clone();
        let late = engine.clone();

        engine
            .get_file_info(vec![uri("/a")], FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, answers| {
                let rejected = late.open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, |_, _| {});
                results
                    .lock()
                    .unwrap()
                    .push((answers.len(), matches!(rejected, Err(VfsError::Rejected))));
            })
            .unwrap();
    }

    let deadline = Instant::now() + TIMEOUT;
    while backend.blocked(BackendCall::GetFileInfo) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(engine.active_job_count(), 3);

    let resumer = {
        let backend = backend.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            backend.resume(BackendCall::GetFileInfo);
        })
    };

    engine.shutdown(&event_loop).unwrap();
    resumer.join().unwrap();

    assert_eq!(*results.lock().unwrap(), vec![(1, true); 3]);
    assert_eq!(engine.active_job_count(), 0);
    assert_eq!(engine.job_count(), 0);

    assert!(matches!(
        engine.open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, |_, _| {}),
        Err(VfsError::Rejected)
    ));

    // Idempotent.
    engine.shutdown(&event_loop).unwrap();
}

#[mandatum::test]
fn shutdown_closes_files_left_open() {
    backend.insert_file("/a", "a");

    let opened = Arc::new(AtomicBool::new(false));
    let flag = opened.clone();
    let handle = engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |_, result| {
            result.unwrap();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || opened.load(Ordering::SeqCst)));
    assert_eq!(backend.open_files(), 1);

    engine.shutdown(&event_loop).unwrap();

    assert_eq!(backend.open_files(), 0);
    assert_eq!(engine.job_count(), 0);
    assert!(matches!(
        engine.close(handle, |_, _| {}),
        Err(VfsError::InvalidHandle(_) | VfsError::Rejected)
    ));
}

#[mandatum::test]
fn close_refused_during_shutdown_still_closes_the_file() {
    backend.insert_file("/a", "a");
    backend.pause(BackendCall::Open);

    let refused = Arc::new(Mutex::new(None));
    let slot = refused.clone();
    let closer = engine.clone();
    engine
        .open(uri("/a"), OpenMode::READ, PRIORITY_DEFAULT, move |handle, result| {
            result.unwrap();
            let closed = closer.close(handle, |_, _| {});
            *slot.lock().unwrap() = Some(matches!(closed, Err(VfsError::Rejected)));
        })
        .unwrap();

    let resumer = {
        let backend = backend.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + TIMEOUT;
            while backend.blocked(BackendCall::Open) < 1 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(50));
            backend.resume(BackendCall::Open);
        })
    };

    engine.shutdown(&event_loop).unwrap();
    resumer.join().unwrap();

    assert_eq!(*refused.lock().unwrap(), Some(true));
    assert_eq!(backend.open_files(), 0);
    assert_eq!(backend.close_count(), 1);
    assert_eq!(engine.job_count(), 0);
}

#[mandatum::test]
fn dropping_the_loop_shuts_down() {
    backend.insert_file("/a", "a");

    let answered = Arc::new(AtomicBool::new(false));
    let flag = answered.clone();
    engine
        .get_file_info(vec![uri("/a")], FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, _| {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    drop(event_loop);

    assert!(answered.load(Ordering::SeqCst));
    assert_eq!(engine.job_count(), 0);
    assert!(matches!(
        engine.get_file_info(vec![uri("/a")], FileInfoOptions::default(), PRIORITY_DEFAULT, |_, _| {}),
        Err(VfsError::Rejected)
    ));
}

#[test]
fn shutdown_refuses_a_foreign_loop() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (engine, event_loop) = EngineBuilder::new().build(Arc::new(MemoryBackend::new()));
    let (_other, other_loop) = EngineBuilder::new().build(Arc::new(MemoryBackend::new()));

    assert!(matches!(
        engine.shutdown(&other_loop),
        Err(VfsError::BadParameters(_))
    ));
    assert!(engine.shutdown(&event_loop).is_ok());
}
