use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camino::Utf8PathBuf;
use futures::{stream, StreamExt};
use longship_app_core::{ControllerError, UpdateController, UpdateEvent};
use longship_core::{EntryKind, ManifestEntry, RemoteManifest, ScanStatus};
use longship_infra::checksum_bytes;
use longship_pipeline::{
    DefaultSyncEngine, ProgressSnapshot, RemoteBody, RemoteSource, RetryPolicy, SyncError,
    SyncOptions,
};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct StubRemote {
    statuses: Mutex<VecDeque<ScanStatus>>,
    files: HashMap<String, Vec<u8>>,
}

impl StubRemote {
    fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            statuses: Mutex::default(),
            files: files
                .iter()
                .map(|(p, d)| (p.to_string(), d.to_vec()))
                .collect(),
        }
    }

    fn statuses(self, statuses: &[ScanStatus]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
        self
    }
}

#[async_trait::async_trait]
impl RemoteSource for StubRemote {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError> {
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScanStatus::Completed);
        let mut entries: Vec<ManifestEntry> = self
            .files
            .iter()
            .map(|(path, data)| ManifestEntry {
                relative_path: path.clone(),
                kind: EntryKind::File,
                content_hash: checksum_bytes(data),
            })
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(RemoteManifest { status, entries })
    }

    async fn open_file(&self, relative_path: &str) -> Result<RemoteBody, SyncError> {
        let data = self
            .files
            .get(relative_path)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("404 {relative_path}")))?;
        Ok(stream::iter(vec![Ok(Bytes::from(data))]).boxed())
    }

    async fn fetch_link_target(&self, relative_path: &str) -> Result<String, SyncError> {
        Err(SyncError::Network(format!("404 {relative_path}")))
    }
}

fn controller(remote: StubRemote, backoff: Duration) -> (UpdateController, Receiver<UpdateEvent>) {
    let engine = DefaultSyncEngine::new(Arc::new(remote), None);
    let options = SyncOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            backoff,
        },
        ..SyncOptions::default()
    };
    UpdateController::new(Arc::new(engine), options)
}

/// Collect events until a terminal one arrives.
fn until_terminal(rx: &mut Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(ev) => {
                let done = ev.is_terminal();
                seen.push(ev);
                if done {
                    return seen;
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    panic!("no terminal event, saw {seen:?}");
}

fn game_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("valheim")).unwrap();
    (dir, root)
}

#[test]
fn full_event_queue_does_not_hold_back_the_cycle() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[("a.txt", b"alpha")]);
    let (ctl, mut rx) = controller(remote, Duration::from_millis(10));
    let publisher = ctl.events();
    while publisher.try_send(UpdateEvent::Announcement(None)).is_ok() {}

    let handle = ctl.start(root.clone(), CancellationToken::new()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !root.join("a.txt").exists() {
        assert!(Instant::now() < deadline, "cycle waited on a full event queue");
        std::thread::sleep(Duration::from_millis(5));
    }

    let events = until_terminal(&mut rx);
    assert!(matches!(events.last(), Some(UpdateEvent::Finished(Ok(_)))));
    handle.join().unwrap();
}

#[test]
fn channel_closes_with_the_worker_once_the_controller_is_gone() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[("a.txt", b"alpha")]);
    let (ctl, mut rx) = controller(remote, Duration::from_millis(10));

    let handle = ctl.start(root, CancellationToken::new()).unwrap();
    drop(ctl);
    handle.join().unwrap();

    let mut last = None;
    while let Some(ev) = rx.blocking_recv() {
        last = Some(ev);
    }
    assert!(matches!(last, Some(UpdateEvent::Finished(Ok(_)))));
}

#[test]
fn update_runs_to_completion_and_reports() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[("a.txt", b"alpha"), ("BepInEx/b.dll", b"beta")]);
    let (ctl, mut rx) = controller(remote, Duration::from_millis(10));

    let handle = ctl.start(root.clone(), CancellationToken::new()).unwrap();
    let events = until_terminal(&mut rx);
    handle.join().unwrap();

    assert!(matches!(events.first(), Some(UpdateEvent::Started { run_id }) if !run_id.is_nil()));
    match events.last() {
        Some(UpdateEvent::Finished(Ok(report))) => {
            assert_eq!(report.total, 2);
            assert_eq!(report.created, 2);
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert!(events.contains(&UpdateEvent::Progress(ProgressSnapshot {
        current: 2,
        total: 2
    })));
    assert_eq!(ctl.progress(), ProgressSnapshot { current: 2, total: 2 });
    assert!(!ctl.is_running());
    assert_eq!(std::fs::read(root.join("BepInEx/b.dll")).unwrap(), b"beta");
}

#[test]
fn second_start_is_refused_and_cancel_ends_the_cycle() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[("a.txt", b"alpha")]).statuses(&[ScanStatus::Scanning; 3]);
    let (ctl, mut rx) = controller(remote, Duration::from_secs(60));

    let handle = ctl.start(root.clone(), CancellationToken::new()).unwrap();
    assert!(matches!(
        ctl.start(root.clone(), CancellationToken::new()),
        Err(ControllerError::AlreadyRunning)
    ));

    ctl.cancel();
    let events = until_terminal(&mut rx);
    handle.join().unwrap();

    assert_eq!(events.last(), Some(&UpdateEvent::Cancelled));
    assert!(!events.iter().any(|e| matches!(e, UpdateEvent::Finished(_))));
    assert!(!ctl.is_running());
    assert!(!root.join("a.txt").exists());

    // The controller accepts a new cycle once the previous one ended.
    let again = ctl.start(root, CancellationToken::new()).unwrap();
    again.cancel();
    until_terminal(&mut rx);
    again.join().unwrap();
}

#[test]
fn scanning_server_is_reported_as_retrying() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[("a.txt", b"alpha")]).statuses(&[ScanStatus::Scanning]);
    let (ctl, mut rx) = controller(remote, Duration::from_millis(10));

    let handle = ctl.start(root, CancellationToken::new()).unwrap();
    let events = until_terminal(&mut rx);
    handle.join().unwrap();

    assert!(events.contains(&UpdateEvent::Retrying {
        attempt: 1,
        max_attempts: 3
    }));
    assert!(matches!(events.last(), Some(UpdateEvent::Finished(Ok(_)))));
}

#[test]
fn failure_carries_the_user_facing_reason() {
    let (_dir, root) = game_root();
    let remote = StubRemote::with_files(&[]).statuses(&[ScanStatus::Failed]);
    let (ctl, mut rx) = controller(remote, Duration::from_millis(10));

    let handle = ctl.start(root, CancellationToken::new()).unwrap();
    let events = until_terminal(&mut rx);
    handle.join().unwrap();

    assert_eq!(
        events.last(),
        Some(&UpdateEvent::Finished(Err(
            SyncError::ManifestUnavailable(ScanStatus::Failed).user_message()
        )))
    );
}
