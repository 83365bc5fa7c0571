/*!
 * Watcher Tests
 * Bridge behavior over a scripted tree watch, plus end-to-end notify runs
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sandbox_fs::{
    FsError, FsEvent, SandboxFs, TreeChange, TreeSubscription, TreeWatch, TreeWatchEvent,
    WatchConfig, WatchError,
};
use serial_test::serial;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use tokio::sync::mpsc;

/// Tree watch whose stream is driven by the test
struct ScriptedWatch {
    prelude: Mutex<Vec<TreeWatchEvent>>,
    sender: Mutex<Option<mpsc::UnboundedSender<TreeWatchEvent>>>,
    calls: AtomicUsize,
}

impl ScriptedWatch {
    fn new(prelude: Vec<TreeWatchEvent>) -> Arc<Self> {
        Arc::new(Self {
            prelude: Mutex::new(prelude),
            sender: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn ready() -> Arc<Self> {
        Self::new(vec![TreeWatchEvent::Ready])
    }

    fn emit(&self, change: TreeChange, path: PathBuf) {
        let sender = self.sender.lock();
        sender
            .as_ref()
            .expect("watch not started")
            .send(TreeWatchEvent::Change { change, path })
            .unwrap();
    }

    fn close(&self) {
        self.sender.lock().take();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeWatch for ScriptedWatch {
    async fn watch(&self, _root: &Path) -> Result<TreeSubscription, WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        for event in self.prelude.lock().drain(..) {
            tx.send(event).unwrap();
        }
        *self.sender.lock() = Some(tx);
        Ok(TreeSubscription::new(rx, ()))
    }
}

fn scripted(watch: Arc<ScriptedWatch>) -> (TempDir, PathBuf, SandboxFs) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let fs = SandboxFs::builder(temp.path())
        .with_tree_watch(watch)
        .build()
        .unwrap();
    (temp, root, fs)
}

async fn next_event(rx: &mut Receiver<FsEvent>, wait: Duration) -> Option<FsEvent> {
    tokio::time::timeout(wait, rx.recv()).await.ok()?.ok()
}

async fn collect_for(rx: &mut Receiver<FsEvent>, window: Duration) -> Vec<FsEvent> {
    let deadline = tokio::time::Instant::now() + window;
    let mut events = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

const SHORT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_watcher_is_sole_publisher() {
    let watch = ScriptedWatch::ready();
    let (_temp, root, fs) = scripted(watch.clone());
    let mut rx = fs.events().subscribe_all();

    assert!(!fs.is_watching());
    fs.start_watcher().await.unwrap();
    assert!(fs.is_watching());

    // Engine writes are silent while the watcher runs
    fs.create_file("/w.md", "").await.unwrap();
    assert_eq!(next_event(&mut rx, SHORT).await, None);

    watch.emit(TreeChange::Add, root.join("w.md"));
    assert_eq!(
        next_event(&mut rx, SHORT).await,
        Some(FsEvent::FileCreated { path: "/w.md".into() })
    );
    assert_eq!(next_event(&mut rx, SHORT).await, None);

    fs.stop_watcher().await;
}

#[tokio::test]
async fn test_changes_map_to_logical_events() {
    let watch = ScriptedWatch::ready();
    let (_temp, root, fs) = scripted(watch.clone());
    let mut rx = fs.events().subscribe_all();
    fs.start_watcher().await.unwrap();

    watch.emit(TreeChange::AddDir, root.join("d"));
    watch.emit(TreeChange::Change, root.join("d").join("f.txt"));
    watch.emit(TreeChange::Unlink, root.join("d").join("f.txt"));
    watch.emit(TreeChange::UnlinkDir, root.join("d"));

    assert_eq!(
        collect_for(&mut rx, SHORT).await,
        vec![
            FsEvent::DirectoryCreated { path: "/d".into() },
            FsEvent::FileUpdated { path: "/d/f.txt".into() },
            FsEvent::FileRemoved { path: "/d/f.txt".into() },
            FsEvent::DirectoryRemoved { path: "/d".into() },
        ]
    );
}

#[tokio::test]
async fn test_root_and_foreign_paths_are_dropped() {
    let watch = ScriptedWatch::ready();
    let (_temp, root, fs) = scripted(watch.clone());
    let mut rx = fs.events().subscribe_all();
    fs.start_watcher().await.unwrap();

    watch.emit(TreeChange::AddDir, root.clone());
    watch.emit(TreeChange::Add, PathBuf::from("/somewhere/else.txt"));
    watch.emit(TreeChange::Add, root.join("kept.txt"));

    assert_eq!(
        collect_for(&mut rx, SHORT).await,
        vec![FsEvent::FileCreated { path: "/kept.txt".into() }]
    );
}

#[tokio::test]
async fn test_changes_before_ready_are_ignored() {
    let temp_root = TempDir::new().unwrap();
    let early = temp_root.path().canonicalize().unwrap().join("early.txt");
    let watch = ScriptedWatch::new(vec![
        TreeWatchEvent::Change {
            change: TreeChange::Add,
            path: early,
        },
        TreeWatchEvent::Ready,
    ]);
    let fs = SandboxFs::builder(temp_root.path())
        .with_tree_watch(watch.clone())
        .build()
        .unwrap();
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    assert_eq!(next_event(&mut rx, SHORT).await, None);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let watch = ScriptedWatch::ready();
    let (_temp, _root, fs) = scripted(watch.clone());

    fs.start_watcher().await.unwrap();
    fs.start_watcher().await.unwrap();
    assert_eq!(watch.calls(), 1);
    fs.stop_watcher().await;
}

#[tokio::test]
async fn test_stop_restores_engine_events() {
    let watch = ScriptedWatch::ready();
    let (_temp, _root, fs) = scripted(watch.clone());
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    fs.stop_watcher().await;
    assert!(!fs.is_watching());

    fs.create_file("/after.txt", "").await.unwrap();
    assert_eq!(
        next_event(&mut rx, SHORT).await,
        Some(FsEvent::FileCreated { path: "/after.txt".into() })
    );

    // Stopping twice is harmless
    fs.stop_watcher().await;
}

#[tokio::test]
async fn test_scan_failure_is_reported() {
    let watch = ScriptedWatch::new(vec![TreeWatchEvent::Error("boom".into())]);
    let (_temp, _root, fs) = scripted(watch);

    let err = fs.start_watcher().await.unwrap_err();
    assert!(matches!(
        err,
        FsError::Watch(WatchError::ScanFailed { ref reason }) if reason == "boom"
    ));
    assert!(!fs.is_watching());
}

#[tokio::test]
async fn test_stream_closed_before_ready() {
    let watch = ScriptedWatch::new(Vec::new());
    let (_temp, _root, fs) = scripted(watch.clone());
    // Drop the only sender once the subscription exists
    let closer = {
        let watch = watch.clone();
        tokio::spawn(async move {
            assert!(wait_until(|| watch.calls() == 1).await);
            watch.close();
        })
    };

    let err = fs.start_watcher().await.unwrap_err();
    assert!(matches!(err, FsError::Watch(WatchError::ClosedBeforeReady)));
    closer.await.unwrap();
}

#[tokio::test]
async fn test_stream_end_hands_publishing_back() {
    let watch = ScriptedWatch::ready();
    let (_temp, _root, fs) = scripted(watch.clone());

    fs.start_watcher().await.unwrap();
    watch.close();
    assert!(wait_until(|| !fs.is_watching()).await);

    // A finished session can be restarted
    watch.prelude.lock().push(TreeWatchEvent::Ready);
    fs.start_watcher().await.unwrap();
    assert_eq!(watch.calls(), 2);
    assert!(fs.is_watching());
    fs.stop_watcher().await;
}

fn notify_fs(temp: &TempDir) -> SandboxFs {
    SandboxFs::builder(temp.path())
        .with_watch_config(WatchConfig {
            debounce_ms: 50,
            created_grace_ms: 500,
        })
        .build()
        .unwrap()
}

fn events_for<'a>(events: &'a [FsEvent], path: &str) -> Vec<&'a FsEvent> {
    events.iter().filter(|event| event.path() == path).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_notify_api_write_yields_one_event() {
    let temp = TempDir::new().unwrap();
    let fs = notify_fs(&temp);
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    fs.create_file("/w.md", "# hello").await.unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1500)).await;
    assert_eq!(
        events_for(&events, "/w.md"),
        vec![&FsEvent::FileCreated { path: "/w.md".into() }]
    );

    fs.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_notify_external_write_yields_one_event() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("existing.txt"), b"before").unwrap();
    let fs = notify_fs(&temp);
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    std::fs::write(temp.path().join("external.txt"), b"from elsewhere").unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1500)).await;
    assert_eq!(
        events_for(&events, "/external.txt"),
        vec![&FsEvent::FileCreated {
            path: "/external.txt".into()
        }]
    );
    // Pre-existing nodes are part of the initial scan
    assert!(events_for(&events, "/existing.txt").is_empty());

    fs.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_notify_removal_yields_one_event() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("dir/nested")).unwrap();
    std::fs::write(temp.path().join("dir/nested/f.txt"), b"f").unwrap();
    let fs = notify_fs(&temp);
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    fs.remove("/dir").await.unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1500)).await;
    assert_eq!(
        events_for(&events, "/dir"),
        vec![&FsEvent::DirectoryRemoved { path: "/dir".into() }]
    );

    fs.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_notify_update_after_create_is_reported() {
    let temp = TempDir::new().unwrap();
    let fs = notify_fs(&temp);
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    fs.create_file("/a.txt", "one").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fs.update_file("/a.txt", "two").await.unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1500)).await;
    assert_eq!(
        events_for(&events, "/a.txt"),
        vec![
            &FsEvent::FileCreated { path: "/a.txt".into() },
            &FsEvent::FileUpdated { path: "/a.txt".into() },
        ]
    );

    fs.stop_watcher().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_notify_directory_move_reports_every_child() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/x"), b"x").unwrap();
    std::fs::write(temp.path().join("src/y"), b"y").unwrap();
    let fs = notify_fs(&temp);
    let mut rx = fs.events().subscribe_all();

    fs.start_watcher().await.unwrap();
    fs.move_path("/src", "/dst").await.unwrap();

    let events = collect_for(&mut rx, Duration::from_millis(1500)).await;
    for (path, expected) in [
        ("/dst", FsEvent::DirectoryCreated { path: "/dst".into() }),
        ("/dst/x", FsEvent::FileCreated { path: "/dst/x".into() }),
        ("/dst/y", FsEvent::FileCreated { path: "/dst/y".into() }),
        ("/src/x", FsEvent::FileRemoved { path: "/src/x".into() }),
        ("/src/y", FsEvent::FileRemoved { path: "/src/y".into() }),
        ("/src", FsEvent::DirectoryRemoved { path: "/src".into() }),
    ] {
        assert_eq!(events_for(&events, path), vec![&expected], "{path}");
    }

    let position = |wanted: FsEvent| events.iter().position(|event| *event == wanted).unwrap();
    assert!(
        position(FsEvent::DirectoryCreated { path: "/dst".into() })
            < position(FsEvent::DirectoryRemoved { path: "/src".into() })
    );

    fs.stop_watcher().await;
}
