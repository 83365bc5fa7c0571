/*!
 * Watch Bridge
 * Forwards tree watch changes to the event bus and owns engine suppression
 */

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::WatchError;
use super::tree::{TreeChange, TreeSubscription, TreeWatch, TreeWatchEvent};
use crate::events::{EventBus, FsEvent, SuppressionFlag};
use crate::sandbox::PathSandbox;

/// Running forwarder for one watch session
struct ActiveWatch {
    session: Uuid,
    task: JoinHandle<()>,
}

/// Bridge between an external tree watcher and the event bus
///
/// While a watch session is active the bridge is the only publisher and
/// engine-originated events are suppressed.
pub struct WatchBridge {
    sandbox: PathSandbox,
    bus: Arc<EventBus>,
    suppression: SuppressionFlag,
    tree_watch: Arc<dyn TreeWatch>,
    active: Mutex<Option<ActiveWatch>>,
}

impl WatchBridge {
    pub(crate) fn new(
        sandbox: PathSandbox,
        bus: Arc<EventBus>,
        suppression: SuppressionFlag,
        tree_watch: Arc<dyn TreeWatch>,
    ) -> Self {
        Self {
            sandbox,
            bus,
            suppression,
            tree_watch,
            active: Mutex::new(None),
        }
    }

    /// Start watching the sandbox root
    ///
    /// Completes once the initial scan is ready. Idempotent while active.
    pub async fn start(&self) -> Result<(), WatchError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                debug!(session = %current.session, "watcher already running");
                return Ok(());
            }
        }

        let session = Uuid::new_v4();
        info!(%session, "starting watcher");
        let mut subscription = self.tree_watch.watch(self.sandbox.root()).await?;
        wait_until_ready(&mut subscription).await?;

        self.suppression.set(true);
        let forwarder = Forwarder {
            sandbox: self.sandbox.clone(),
            bus: self.bus.clone(),
            suppression: self.suppression.clone(),
        };
        let task = tokio::spawn(forwarder.run(subscription, session));
        *active = Some(ActiveWatch { session, task });

        info!(%session, "watcher ready");
        Ok(())
    }

    /// Stop watching; engine events are published again afterwards
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(current) = active.take() {
            current.task.abort();
            let _ = current.task.await;
            self.suppression.set(false);
            info!(session = %current.session, "watcher stopped");
        }
    }

    /// Whether a watch session is forwarding events
    #[inline]
    pub fn is_active(&self) -> bool {
        self.suppression.is_active()
    }
}

impl Drop for WatchBridge {
    fn drop(&mut self) {
        if let Some(current) = self.active.get_mut().take() {
            current.task.abort();
            self.suppression.set(false);
        }
    }
}

async fn wait_until_ready(subscription: &mut TreeSubscription) -> Result<(), WatchError> {
    loop {
        match subscription.recv().await {
            Some(TreeWatchEvent::Ready) => return Ok(()),
            Some(TreeWatchEvent::Change { change, path }) => {
                debug!(%change, path = %path.display(), "ignoring change before ready");
            }
            Some(TreeWatchEvent::Error(reason)) => return Err(WatchError::ScanFailed { reason }),
            None => return Err(WatchError::ClosedBeforeReady),
        }
    }
}

struct Forwarder {
    sandbox: PathSandbox,
    bus: Arc<EventBus>,
    suppression: SuppressionFlag,
}

impl Forwarder {
    async fn run(self, mut subscription: TreeSubscription, session: Uuid) {
        while let Some(event) = subscription.recv().await {
            match event {
                TreeWatchEvent::Change { change, path } => {
                    let Some(logical) = self.sandbox.to_logical(&path) else {
                        warn!(%session, %change, "dropping change outside sandbox root");
                        continue;
                    };
                    if logical == "/" {
                        debug!(%session, %change, "ignoring change to sandbox root");
                        continue;
                    }
                    self.bus.dispatch(to_event(change, logical));
                }
                TreeWatchEvent::Error(reason) => {
                    warn!(%session, %reason, "watcher reported an error");
                }
                TreeWatchEvent::Ready => {}
            }
        }

        // Stream ended on its own; hand publishing back to the engine
        warn!(%session, "watcher stream closed");
        self.suppression.set(false);
    }
}

fn to_event(change: TreeChange, path: String) -> FsEvent {
    match change {
        TreeChange::Add => FsEvent::FileCreated { path },
        TreeChange::AddDir => FsEvent::DirectoryCreated { path },
        TreeChange::Unlink => FsEvent::FileRemoved { path },
        TreeChange::UnlinkDir => FsEvent::DirectoryRemoved { path },
        TreeChange::Change => FsEvent::FileUpdated { path },
    }
}
