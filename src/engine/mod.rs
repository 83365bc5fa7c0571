/*!
 * Operation Engine
 * Sandboxed file and directory operations with change notifications
 *
 * Every operation follows the same pipeline:
 * validate -> resolve -> probe -> delegate -> map errors -> publish
 */

mod builder;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::delegate::{BulkOps, IoFailure};
use crate::errors::{FsError, FsResult};
use crate::events::{EventBus, FsEvent, FsEventKind};
use crate::probe::{self, NodeKind, NodeStat};
use crate::sandbox::path::{join_child, trim_trailing_separator};
use crate::sandbox::{is_path_within, PathSandbox, ResolvedPath};
use crate::watch::WatchBridge;

pub use builder::SandboxFsBuilder;

/// One child returned by [`SandboxFs::read_directory`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub path: String,
    pub basename: String,
    pub is_directory: bool,
    pub is_file: bool,
}

/// Filesystem confined to a single root directory
pub struct SandboxFs {
    sandbox: PathSandbox,
    bulk: Arc<dyn BulkOps>,
    bus: Arc<EventBus>,
    watcher: WatchBridge,
    readonly: bool,
}

impl SandboxFs {
    /// Create a builder for a sandbox rooted at `root`
    pub fn builder<P: AsRef<Path>>(root: P) -> SandboxFsBuilder {
        SandboxFsBuilder::new(root)
    }

    /// Create a sandbox with default collaborators
    pub fn new<P: AsRef<Path>>(root: P) -> FsResult<Self> {
        Self::builder(root).build()
    }

    /// Create a sandbox from configuration
    pub fn from_config(config: &crate::config::FsConfig) -> FsResult<Self> {
        Self::builder(&config.root)
            .with_readonly(config.readonly)
            .with_event_capacity(config.event_capacity)
            .with_watch_config(config.watch)
            .build()
    }

    /// Event bus of this instance
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register a handler for one event type
    pub fn subscribe<F>(&self, kind: FsEventKind, handler: F)
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler);
    }

    #[inline]
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Create a file that must not exist yet, creating missing parents
    #[instrument(level = "debug", skip(self, contents))]
    pub async fn create_file<C>(&self, path: &str, contents: C) -> FsResult<()>
    where
        C: AsRef<[u8]>,
    {
        self.check_writable("create_file")?;
        require("path", path)?;
        let target = self.resolve(self.sandbox.resolve_entry(path)?).await?;

        if probe::path_exists(target.real(), None).await? {
            return Err(FsError::path_exists(target.logical()));
        }
        if let Some(parent) = target.real().parent() {
            self.bulk.ensure_dir(parent).await?;
        }

        write_new(target.real(), contents.as_ref())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::AlreadyExists => FsError::path_exists(target.logical()),
                _ => e.into(),
            })?;

        debug!(path = %target.logical(), "file created");
        self.publish(FsEvent::FileCreated {
            path: target.logical().to_string(),
        });
        Ok(())
    }

    /// Read a file's bytes
    #[instrument(level = "debug", skip(self))]
    pub async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        require("path", path)?;
        let target = self.resolve(self.sandbox.resolve(path)?).await?;

        tokio::fs::read(target.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(target.logical()),
                IoFailure::IsDirectory => FsError::path_is_directory(target.logical()),
                _ => e.into(),
            })
    }

    /// Overwrite an existing file
    #[instrument(level = "debug", skip(self, contents))]
    pub async fn update_file<C>(&self, path: &str, contents: C) -> FsResult<()>
    where
        C: AsRef<[u8]>,
    {
        self.check_writable("update_file")?;
        require("path", path)?;
        let target = self.resolve(self.sandbox.resolve_entry(path)?).await?;

        let node = self.stat_existing(&target).await?;
        if node.is_directory {
            return Err(FsError::path_is_directory(target.logical()));
        }

        overwrite(target.real(), contents.as_ref())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(target.logical()),
                IoFailure::IsDirectory => FsError::path_is_directory(target.logical()),
                _ => e.into(),
            })?;

        debug!(path = %target.logical(), "file updated");
        self.publish(FsEvent::FileUpdated {
            path: target.logical().to_string(),
        });
        Ok(())
    }

    /// Create a directory that must not exist yet, creating missing parents
    #[instrument(level = "debug", skip(self))]
    pub async fn create_directory(&self, path: &str) -> FsResult<()> {
        self.check_writable("create_directory")?;
        require("path", path)?;
        let target = self
            .resolve(self.sandbox.resolve_entry(trim_trailing_separator(path))?)
            .await?;

        if probe::path_exists(target.real(), None).await? {
            return Err(FsError::path_exists(target.logical()));
        }
        if let Some(parent) = target.real().parent() {
            self.bulk.ensure_dir(parent).await?;
        }

        tokio::fs::create_dir(target.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::AlreadyExists => FsError::path_exists(target.logical()),
                _ => e.into(),
            })?;

        debug!(path = %target.logical(), "directory created");
        self.publish(FsEvent::DirectoryCreated {
            path: target.logical().to_string(),
        });
        Ok(())
    }

    /// List a directory; an empty path lists the root
    ///
    /// Children that vanish between listing and stat are skipped.
    #[instrument(level = "debug", skip(self))]
    pub async fn read_directory(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = self
            .resolve(self.sandbox.resolve_listing(trim_trailing_separator(path))?)
            .await?;

        let node = self.stat_existing(&dir).await?;
        if !node.is_directory {
            return Err(FsError::path_is_not_directory(dir.logical()));
        }

        let mut listing = tokio::fs::read_dir(dir.real())
            .await
            .map_err(|e| map_directory_error(e, &dir))?;

        let mut entries = Vec::new();
        while let Some(child) = listing
            .next_entry()
            .await
            .map_err(|e| map_directory_error(e, &dir))?
        {
            let Some(basename) = child.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(parent = %dir.logical(), "skipping entry with non UTF-8 name");
                continue;
            };
            let child_path = join_child(dir.logical(), &basename);

            let node = match probe::stat(&child.path()).await {
                Ok(node) => node,
                Err(e) if IoFailure::of(&e) == IoFailure::NotFound => {
                    debug!(path = %child_path, "entry vanished during listing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            entries.push(DirEntry {
                path: child_path,
                basename,
                is_directory: node.is_directory,
                is_file: node.is_file,
            });
        }

        entries.sort_by(|a, b| a.basename.cmp(&b.basename));
        Ok(entries)
    }

    /// Move a file or directory tree by copying it and deleting the source
    ///
    /// Publishes the creation of `to_path` before the removal of `from_path`.
    #[instrument(level = "debug", skip(self))]
    pub async fn move_path(&self, from_path: &str, to_path: &str) -> FsResult<()> {
        self.check_writable("move")?;
        require("fromPath", from_path)?;
        require("toPath", to_path)?;

        let from = self
            .sandbox
            .resolve_entry(trim_trailing_separator(from_path))?;
        let to = self.sandbox.resolve_entry(trim_trailing_separator(to_path))?;
        if is_path_within(to.logical(), from.logical()) {
            return Err(FsError::invalid_option(
                "toPath",
                "containment",
                format!(
                    "cannot move '{}' into its own descendant '{}'",
                    from.logical(),
                    to.logical()
                ),
            ));
        }
        let from = self.resolve(from).await?;
        let to = self.resolve(to).await?;

        let kind = self.stat_existing(&from).await?.kind().unwrap_or(NodeKind::File);
        if probe::path_exists(to.real(), None).await? {
            return Err(FsError::path_exists(to.logical()));
        }
        if let Some(parent) = to.real().parent() {
            self.bulk.ensure_dir(parent).await?;
        }

        self.bulk
            .copy_tree(from.real(), to.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(from.logical()),
                IoFailure::AlreadyExists => FsError::path_exists(to.logical()),
                _ => e.into(),
            })?;
        self.publish(FsEvent::created(kind, to.logical()));

        self.bulk
            .remove_tree(from.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(from.logical()),
                _ => e.into(),
            })?;
        self.publish(FsEvent::removed(kind, from.logical()));

        debug!(from = %from.logical(), to = %to.logical(), %kind, "moved");
        Ok(())
    }

    /// Delete a file or directory tree
    #[instrument(level = "debug", skip(self))]
    pub async fn remove(&self, path: &str) -> FsResult<()> {
        self.check_writable("remove")?;
        require("path", path)?;
        let target = self
            .resolve(self.sandbox.resolve_entry(trim_trailing_separator(path))?)
            .await?;

        let kind = self.stat_existing(&target).await?.kind().unwrap_or(NodeKind::File);
        self.bulk
            .remove_tree(target.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(target.logical()),
                _ => e.into(),
            })?;

        debug!(path = %target.logical(), %kind, "removed");
        self.publish(FsEvent::removed(kind, target.logical()));
        Ok(())
    }

    /// Whether a node exists, optionally of a specific kind
    #[instrument(level = "debug", skip(self))]
    pub async fn path_exists(&self, path: &str, expected: Option<NodeKind>) -> FsResult<bool> {
        let target = self.resolve(self.sandbox.resolve_listing(path)?).await?;
        Ok(probe::path_exists(target.real(), expected).await?)
    }

    /// Kind of an existing node
    #[instrument(level = "debug", skip(self))]
    pub async fn stat(&self, path: &str) -> FsResult<NodeStat> {
        let target = self.resolve(self.sandbox.resolve_listing(path)?).await?;
        self.stat_existing(&target).await
    }

    /// Start the filesystem watcher; completes once its initial scan is ready
    ///
    /// While the watcher runs it is the only source of events.
    pub async fn start_watcher(&self) -> FsResult<()> {
        self.watcher.start().await?;
        Ok(())
    }

    /// Stop the filesystem watcher; operations publish their own events again
    pub async fn stop_watcher(&self) {
        self.watcher.stop().await;
    }

    #[inline]
    pub fn is_watching(&self) -> bool {
        self.watcher.is_active()
    }

    async fn resolve(&self, resolved: ResolvedPath) -> FsResult<ResolvedPath> {
        self.sandbox.confine(&resolved).await?;
        Ok(resolved)
    }

    async fn stat_existing(&self, target: &ResolvedPath) -> FsResult<NodeStat> {
        probe::stat(target.real())
            .await
            .map_err(|e| match IoFailure::of(&e) {
                IoFailure::NotFound => FsError::path_does_not_exist(target.logical()),
                _ => e.into(),
            })
    }

    fn check_writable(&self, operation: &'static str) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::ReadOnly { operation });
        }
        Ok(())
    }

    fn publish(&self, event: FsEvent) {
        self.bus.publish(event);
    }
}

impl std::fmt::Debug for SandboxFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxFs")
            .field("readonly", &self.readonly)
            .field("watching", &self.is_watching())
            .finish_non_exhaustive()
    }
}

fn require(option: &str, value: &str) -> FsResult<()> {
    if value.is_empty() {
        return Err(FsError::invalid_option(
            option,
            "required",
            format!("{option} must be a non-empty string"),
        ));
    }
    Ok(())
}

fn map_directory_error(e: std::io::Error, dir: &ResolvedPath) -> FsError {
    match IoFailure::of(&e) {
        IoFailure::NotFound => FsError::path_does_not_exist(dir.logical()),
        IoFailure::NotDirectory => FsError::path_is_not_directory(dir.logical()),
        _ => e.into(),
    }
}

async fn write_new(real: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(real)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn overwrite(real: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(real)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await
}
