/*!
 * Local Tree Watch
 * notify-backed subtree watcher with an initial scan and change translation
 */

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::tree::{TreeChange, TreeSubscription, TreeWatch, TreeWatchEvent};
use crate::config::WatchConfig;
use crate::probe::NodeKind;

/// Tree watch over the host filesystem using `notify`
#[derive(Debug, Clone, Default)]
pub struct NotifyTreeWatch {
    config: WatchConfig,
}

impl NotifyTreeWatch {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TreeWatch for NotifyTreeWatch {
    async fn watch(&self, root: &Path) -> Result<TreeSubscription, WatchError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(res);
        })?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::InitFailed {
                reason: format!("cannot watch root: {e}"),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let translator = Translator::new(root.to_path_buf(), self.config, tx);
        let task = tokio::spawn(translator.run(raw_rx));

        Ok(TreeSubscription::new(
            rx,
            WatchGuard {
                _watcher: watcher,
                task,
            },
        ))
    }
}

/// Keeps the notify watcher alive and stops translation on drop
struct WatchGuard {
    _watcher: notify::RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Turns raw notify events into add/addDir/unlink/unlinkDir/change
struct Translator {
    root: PathBuf,
    out: mpsc::UnboundedSender<TreeWatchEvent>,
    /// Known nodes under the root, seeded by the initial scan
    nodes: HashMap<PathBuf, NodeKind>,
    /// Paths already reported as removed, to absorb repeated removals
    removed: HashMap<PathBuf, Instant>,
    debouncer: Debouncer,
    config: WatchConfig,
}

impl Translator {
    fn new(root: PathBuf, config: WatchConfig, out: mpsc::UnboundedSender<TreeWatchEvent>) -> Self {
        Self {
            root,
            out,
            nodes: HashMap::new(),
            removed: HashMap::new(),
            debouncer: Debouncer::new(config.debounce_ms, config.created_grace_ms),
            config,
        }
    }

    async fn run(mut self, mut raw: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        let root = self.root.clone();
        let scanned = tokio::task::spawn_blocking(move || scan(&root))
            .await
            .map_err(io::Error::other)
            .and_then(|res| res);
        match scanned {
            Ok(nodes) => {
                debug!(nodes = nodes.len(), "initial scan complete");
                self.nodes = nodes;
            }
            Err(e) => {
                let _ = self.out.send(TreeWatchEvent::Error(e.to_string()));
                return;
            }
        }

        // Anything queued during the scan describes pre-existing state
        let mut discard = Vec::new();
        while let Ok(res) = raw.try_recv() {
            if let Ok(event) = res {
                self.translate(event, &mut discard).await;
            }
        }
        self.debouncer = Debouncer::new(self.config.debounce_ms, self.config.created_grace_ms);
        trace!(discarded = discard.len(), "dropped events from initial scan window");

        if self.out.send(TreeWatchEvent::Ready).is_err() {
            return;
        }

        let period = Duration::from_millis((self.config.debounce_ms / 2).max(10));
        let mut tick = tokio::time::interval(period);
        let mut batch = Vec::new();
        loop {
            tokio::select! {
                res = raw.recv() => match res {
                    Some(Ok(event)) => self.translate(event, &mut batch).await,
                    Some(Err(e)) => batch.push(TreeWatchEvent::Error(e.to_string())),
                    None => break,
                },
                _ = tick.tick() => self.flush_modifications(&mut batch),
            }

            for event in batch.drain(..) {
                if self.out.send(event).is_err() {
                    return;
                }
            }
        }
    }

    async fn translate(&mut self, event: Event, out: &mut Vec<TreeWatchEvent>) {
        trace!(kind = ?event.kind, paths = ?event.paths, "raw watcher event");
        match event.kind {
            EventKind::Create(CreateKind::Folder) => {
                for path in event.paths {
                    self.added(path, NodeKind::Directory, out).await;
                }
            }
            EventKind::Create(CreateKind::File) => {
                for path in event.paths {
                    self.added(path, NodeKind::File, out).await;
                }
            }
            EventKind::Create(_) => {
                for path in event.paths {
                    self.added_by_stat(path, out).await;
                }
            }
            EventKind::Remove(kind) => {
                let hint = match kind {
                    RemoveKind::Folder => Some(NodeKind::Directory),
                    RemoveKind::File => Some(NodeKind::File),
                    _ => None,
                };
                for path in event.paths {
                    self.removed(path, hint, out);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                let mut paths = event.paths.into_iter();
                match mode {
                    RenameMode::From => {
                        if let Some(from) = paths.next() {
                            self.removed(from, None, out);
                        }
                    }
                    RenameMode::To => {
                        if let Some(to) = paths.next() {
                            self.added_by_stat(to, out).await;
                        }
                    }
                    RenameMode::Both => {
                        if let Some(from) = paths.next() {
                            self.removed(from, None, out);
                        }
                        if let Some(to) = paths.next() {
                            self.added_by_stat(to, out).await;
                        }
                    }
                    _ => {
                        for path in paths {
                            if tokio::fs::symlink_metadata(&path).await.is_ok() {
                                self.added_by_stat(path, out).await;
                            } else {
                                self.removed(path, None, out);
                            }
                        }
                    }
                }
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Modify(_) => {
                for path in event.paths {
                    if self.nodes.get(&path) == Some(&NodeKind::Directory) {
                        continue;
                    }
                    if !self.debouncer.record_modified(path.clone()) {
                        trace!(path = %path.display(), "write folded into creation");
                    }
                }
            }
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                for path in &event.paths {
                    self.debouncer.record_closed(path);
                }
            }
            _ => {}
        }
    }

    async fn added(&mut self, path: PathBuf, kind: NodeKind, out: &mut Vec<TreeWatchEvent>) {
        if !self.insert_node(path.clone(), kind, out) {
            return;
        }
        if kind == NodeKind::Directory {
            self.fill_directory(path, out).await;
        }
    }

    /// Index a node and report it; `false` if it was already known
    fn insert_node(&mut self, path: PathBuf, kind: NodeKind, out: &mut Vec<TreeWatchEvent>) -> bool {
        if path == self.root || self.nodes.contains_key(&path) {
            return false;
        }
        self.removed.remove(&path);
        self.nodes.insert(path.clone(), kind);
        let change = match kind {
            NodeKind::File => {
                self.debouncer.record_created(path.clone());
                TreeChange::Add
            }
            NodeKind::Directory => TreeChange::AddDir,
        };
        out.push(TreeWatchEvent::Change { change, path });
        true
    }

    /// Report whatever landed in a new directory before it was watched
    async fn fill_directory(&mut self, dir: PathBuf, out: &mut Vec<TreeWatchEvent>) {
        let walked = {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || scan(&dir)).await
        };
        let mut children: Vec<(PathBuf, NodeKind)> = match walked {
            Ok(Ok(nodes)) => nodes.into_iter().collect(),
            Ok(Err(e)) => {
                debug!(dir = %dir.display(), error = %e, "cannot scan new directory");
                return;
            }
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "directory scan task failed");
                return;
            }
        };

        // Parents sort before their descendants
        children.sort_by(|a, b| a.0.cmp(&b.0));
        for (path, kind) in children {
            self.insert_node(path, kind, out);
        }
    }

    async fn added_by_stat(&mut self, path: PathBuf, out: &mut Vec<TreeWatchEvent>) {
        match tokio::fs::symlink_metadata(&path).await {
            Ok(md) if md.is_dir() => self.added(path, NodeKind::Directory, out).await,
            Ok(_) => self.added(path, NodeKind::File, out).await,
            // Gone again before it could be inspected
            Err(_) => {}
        }
    }

    fn removed(&mut self, path: PathBuf, hint: Option<NodeKind>, out: &mut Vec<TreeWatchEvent>) {
        if path == self.root {
            return;
        }
        self.debouncer.remove(&path);

        let kind = match self.nodes.remove(&path) {
            Some(kind) => kind,
            None if self.removed.contains_key(&path) => return,
            None => hint.unwrap_or(NodeKind::File),
        };
        if kind == NodeKind::Directory {
            self.nodes.retain(|node, _| !node.starts_with(&path));
        }
        self.removed.insert(path.clone(), Instant::now());

        let change = match kind {
            NodeKind::File => TreeChange::Unlink,
            NodeKind::Directory => TreeChange::UnlinkDir,
        };
        out.push(TreeWatchEvent::Change { change, path });
    }

    fn flush_modifications(&mut self, out: &mut Vec<TreeWatchEvent>) {
        let horizon = Duration::from_millis(self.config.created_grace_ms.max(self.config.debounce_ms));
        let now = Instant::now();
        self.removed
            .retain(|_, removed_at| now.duration_since(*removed_at) < horizon);

        for path in self.debouncer.take_ready() {
            out.push(TreeWatchEvent::Change {
                change: TreeChange::Change,
                path,
            });
        }
    }
}

/// Index every node below `root`
fn scan(root: &Path) -> io::Result<HashMap<PathBuf, NodeKind>> {
    let mut nodes = HashMap::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry during scan");
                continue;
            }
        };
        let kind = if entry.file_type().is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        nodes.insert(entry.into_path(), kind);
    }
    Ok(nodes)
}
