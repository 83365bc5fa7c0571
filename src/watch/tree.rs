/*!
 * Tree Watch Contract
 * Low-level subtree change stream consumed by the watch bridge
 */

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::WatchError;

/// Raw change kinds reported for a watched subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeChange {
    Add,
    AddDir,
    Unlink,
    UnlinkDir,
    Change,
}

impl TreeChange {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TreeChange::Add => "add",
            TreeChange::AddDir => "addDir",
            TreeChange::Unlink => "unlink",
            TreeChange::UnlinkDir => "unlinkDir",
            TreeChange::Change => "change",
        }
    }
}

impl fmt::Display for TreeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item of a tree watch stream, keyed by real path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeWatchEvent {
    /// The initial subtree scan finished
    Ready,
    Change { change: TreeChange, path: PathBuf },
    Error(String),
}

/// Live subscription to a subtree; watching stops when it is dropped
pub struct TreeSubscription {
    events: mpsc::UnboundedReceiver<TreeWatchEvent>,
    _guard: Box<dyn Any + Send>,
}

impl TreeSubscription {
    /// Wrap a receiver together with whatever keeps the producer alive
    pub fn new<G: Any + Send>(events: mpsc::UnboundedReceiver<TreeWatchEvent>, guard: G) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next event, or `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<TreeWatchEvent> {
        self.events.recv().await
    }
}

impl fmt::Debug for TreeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSubscription").finish_non_exhaustive()
    }
}

/// Watches a directory subtree for low-level changes
///
/// Implementations perform an initial scan of the subtree and emit
/// [`TreeWatchEvent::Ready`] once it completes.
#[async_trait]
pub trait TreeWatch: Send + Sync {
    async fn watch(&self, root: &Path) -> Result<TreeSubscription, WatchError>;
}
