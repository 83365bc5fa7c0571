/*!
 * Sandbox Builder
 * Builder pattern for SandboxFs construction
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::SandboxFs;
use crate::config::WatchConfig;
use crate::delegate::{BulkOps, LocalBulkOps};
use crate::errors::{FsError, FsResult};
use crate::events::{EventBus, SuppressionFlag};
use crate::sandbox::PathSandbox;
use crate::watch::{NotifyTreeWatch, TreeWatch, WatchBridge};

/// Builder for SandboxFs
pub struct SandboxFsBuilder {
    root: PathBuf,
    readonly: bool,
    event_capacity: usize,
    watch: WatchConfig,
    bulk_ops: Option<Arc<dyn BulkOps>>,
    tree_watch: Option<Arc<dyn TreeWatch>>,
}

impl SandboxFsBuilder {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            readonly: false,
            event_capacity: 1024,
            watch: WatchConfig::default(),
            bulk_ops: None,
            tree_watch: None,
        }
    }

    /// Reject every mutating operation
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Buffer size of the broadcast event channel
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_watch_config(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    /// Replace the recursive copy/delete primitives
    pub fn with_bulk_ops(mut self, bulk_ops: Arc<dyn BulkOps>) -> Self {
        self.bulk_ops = Some(bulk_ops);
        self
    }

    /// Replace the subtree watcher used by `start_watcher`
    pub fn with_tree_watch(mut self, tree_watch: Arc<dyn TreeWatch>) -> Self {
        self.tree_watch = Some(tree_watch);
        self
    }

    /// Build the SandboxFs
    pub fn build(self) -> FsResult<SandboxFs> {
        if self.event_capacity == 0 {
            return Err(FsError::invalid_option(
                "eventCapacity",
                "positive",
                "event capacity must be greater than zero",
            ));
        }

        let sandbox = PathSandbox::new(&self.root)?;
        let suppression = SuppressionFlag::new();
        let bus = Arc::new(EventBus::new(self.event_capacity, suppression.clone()));
        let tree_watch: Arc<dyn TreeWatch> = match self.tree_watch {
            Some(tree_watch) => tree_watch,
            None => Arc::new(NotifyTreeWatch::new(self.watch)),
        };
        let bulk: Arc<dyn BulkOps> = match self.bulk_ops {
            Some(bulk_ops) => bulk_ops,
            None => Arc::new(LocalBulkOps),
        };
        let watcher = WatchBridge::new(sandbox.clone(), bus.clone(), suppression, tree_watch);

        info!(
            root = %sandbox.root().display(),
            readonly = self.readonly,
            event_capacity = self.event_capacity,
            "sandbox filesystem ready"
        );

        Ok(SandboxFs {
            sandbox,
            bulk,
            bus,
            watcher,
            readonly: self.readonly,
        })
    }
}
