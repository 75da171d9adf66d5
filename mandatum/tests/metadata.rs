use mandatum::testing::BackendCall;
use mandatum::{
    FileInfo, FileInfoOptions, FileType, FindDirectoryKind, PRIORITY_DEFAULT, SetFileInfoMask,
    Uri, VfsError,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn uri(path: &str) -> Uri {
    Uri::new("mem", path)
}

#[mandatum::test]
fn file_info_answers_every_uri() {
    backend.insert_file("/docs/a.txt", "aaa");
    backend.insert_file("/docs/b.txt", "bb");
    backend.insert_directory("/docs/sub");

    let uris = vec![
        uri("/docs/a.txt"),
        uri("/docs/missing"),
        uri("/docs/b.txt"),
        uri("/docs/sub"),
    ];

    let answers = Arc::new(Mutex::new(None));
    let slot = answers.clone();
    engine
        .get_file_info(uris.clone(), FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, results| {
            *slot.lock().unwrap() = Some(results);
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || answers.lock().unwrap().is_some()));
    let answers = answers.lock().unwrap().take().unwrap();

    let answered: Vec<Uri> = answers.iter().map(|answer| answer.uri.clone()).collect();
    assert_eq!(answered, uris);

    for answer in &answers {
        match answer.uri.path() {
            "/docs/missing" => assert!(matches!(answer.result, Err(VfsError::Backend(_)))),
            "/docs/sub" => assert!(answer.result.as_ref().unwrap().is_directory()),
            path => {
                let info = answer.result.as_ref().unwrap();
                assert_eq!(Some(info.name.as_str()), path.rsplit('/').next());
                assert_eq!(info.file_type, FileType::Regular);
            }
        }
    }

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
}

#[mandatum::test]
fn file_info_follows_links_on_request() {
    backend.insert_file("/real", "12345");
    backend.insert_symbolic_link("/alias", "/real");

    let answers = Arc::new(Mutex::new(Vec::new()));

    for follow_links in [false, true] {
        let answers = answers.clone();
        let options = FileInfoOptions {
            follow_links,
            ..FileInfoOptions::default()
        };

        engine
            .get_file_info(vec![uri("/alias")], options, PRIORITY_DEFAULT, move |_, mut results| {
                let info = results.remove(0).result.unwrap();
                answers.lock().unwrap().push((follow_links, info.file_type, info.size));
            })
            .unwrap();
    }

    assert!(event_loop.run_until(TIMEOUT, || answers.lock().unwrap().len() == 2));

    let mut answers = answers.lock().unwrap().clone();
    answers.sort_by_key(|answer| answer.0);

    assert_eq!(answers[0].1, FileType::SymbolicLink);
    assert_eq!(answers[1], (true, FileType::Regular, 5));
}

#[mandatum::test]
fn rename_reports_info_at_new_location() {
    backend.insert_file("/docs/old.txt", "content");

    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    engine
        .set_file_info(
            uri("/docs/old.txt"),
            FileInfo::new("new.txt"),
            SetFileInfoMask::NAME,
            FileInfoOptions::default(),
            PRIORITY_DEFAULT,
            move |_, result, info| {
                *slot.lock().unwrap() = Some((result.is_ok(), info));
            },
        )
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || outcome.lock().unwrap().is_some()));
    let (ok, info) = outcome.lock().unwrap().take().unwrap();

    assert!(ok);
    assert_eq!(info.map(|info| info.name), Some("new.txt".to_string()));
    assert!(!backend.exists("/docs/old.txt"));
    assert_eq!(backend.contents("/docs/new.txt"), Some(b"content".to_vec()));
}

#[mandatum::test]
fn failed_set_file_info_has_no_info() {
    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    engine
        .set_file_info(
            uri("/nowhere"),
            FileInfo {
                permissions: 0o600,
                ..FileInfo::default()
            },
            SetFileInfoMask::PERMISSIONS,
            FileInfoOptions::default(),
            PRIORITY_DEFAULT,
            move |_, result, info| {
                *slot.lock().unwrap() = Some((result.is_err(), info.is_none()));
            },
        )
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || outcome.lock().unwrap().is_some()));
    assert_eq!(*outcome.lock().unwrap(), Some((true, true)));
}

#[mandatum::test]
fn find_directory_answers_per_uri() {
    backend.insert_directory("/home");

    let answers = Arc::new(Mutex::new(None));
    let slot = answers.clone();
    engine
        .find_directory(
            vec![uri("/home"), uri("/missing")],
            FindDirectoryKind::Trash,
            true,
            false,
            0o700,
            PRIORITY_DEFAULT,
            move |_, results| *slot.lock().unwrap() = Some(results),
        )
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || answers.lock().unwrap().is_some()));
    let answers = answers.lock().unwrap().take().unwrap();

    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].near, uri("/home"));
    assert_eq!(answers[0].result.as_ref().ok(), Some(&uri("/.Trash")));
    assert_eq!(answers[1].near, uri("/missing"));
    assert!(answers[1].result.is_err());
    assert!(backend.info("/.Trash").is_some_and(|info| info.is_directory()));
}

#[mandatum::test]
fn directory_arrives_in_batches() {
    for name in ["a", "b", "c", "d", "e"] {
        backend.insert_file(&format!("/list/{name}"), name);
    }

    let batches = Arc::new(Mutex::new(Vec::new()));
    let slot = batches.clone();
    engine
        .load_directory(uri("/list"), FileInfoOptions::default(), 2, PRIORITY_DEFAULT, move |_, result, entries| {
            let names: Vec<String> = entries.into_iter().map(|entry| entry.name).collect();
            slot.lock().unwrap().push((result.map_err(|e| e.is_eof()), names));
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    let names = |list: &[&str]| list.iter().map(|name| name.to_string()).collect::<Vec<_>>();
    assert_eq!(
        *batches.lock().unwrap(),
        vec![
            (Ok(()), names(&["a", "b"])),
            (Ok(()), names(&["c", "d"])),
            (Err(true), names(&["e"])),
        ]
    );
}

#[mandatum::test]
fn listing_a_missing_directory_reports_the_error() {
    let outcome = Arc::new(Mutex::new(Vec::new()));
    let slot = outcome.clone();
    engine
        .load_directory(uri("/nope"), FileInfoOptions::default(), 4, PRIORITY_DEFAULT, move |_, result, entries| {
            slot.lock().unwrap().push((result.is_err(), entries.len()));
        })
        .unwrap();

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    assert_eq!(*outcome.lock().unwrap(), vec![(true, 0)]);
}

#[mandatum::test]
fn zero_batch_size_is_refused() {
    let result = engine.load_directory(uri("/"), FileInfoOptions::default(), 0, PRIORITY_DEFAULT, |_, _, _| {});

    assert!(matches!(result, Err(VfsError::BadParameters(_))));
    assert_eq!(engine.job_count(), 0);
}

#[mandatum::test]
fn cancelled_listing_stops_calling_back() {
    for i in 0..6 {
        backend.insert_file(&format!("/list/{i}"), "");
    }
    backend.pause(BackendCall::ReadDirectory);

    let batches = Arc::new(AtomicUsize::new(0));
    let counter = batches.clone();
    let handle = engine
        .load_directory(uri("/list"), FileInfoOptions::default(), 2, PRIORITY_DEFAULT, move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(backend.wait_until_blocked(BackendCall::ReadDirectory, TIMEOUT));
    engine.cancel(handle);
    backend.resume(BackendCall::ReadDirectory);

    assert!(event_loop.run_until(TIMEOUT, || engine.job_count() == 0));
    event_loop.dispatch_pending();

    assert_eq!(batches.load(Ordering::SeqCst), 0);
}
