/*!
 * Event Bus
 * Change notifications with per-type handlers and a broadcast channel
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use crate::probe::NodeKind;

/// A change to one node, addressed by logical path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FsEvent {
    FileCreated { path: String },
    FileRemoved { path: String },
    FileUpdated { path: String },
    DirectoryCreated { path: String },
    DirectoryRemoved { path: String },
}

impl FsEvent {
    /// Creation event for a node of the given kind
    pub fn created(kind: NodeKind, path: impl Into<String>) -> Self {
        let path = path.into();
        match kind {
            NodeKind::File => FsEvent::FileCreated { path },
            NodeKind::Directory => FsEvent::DirectoryCreated { path },
        }
    }

    /// Removal event for a node of the given kind
    pub fn removed(kind: NodeKind, path: impl Into<String>) -> Self {
        let path = path.into();
        match kind {
            NodeKind::File => FsEvent::FileRemoved { path },
            NodeKind::Directory => FsEvent::DirectoryRemoved { path },
        }
    }

    pub fn kind(&self) -> FsEventKind {
        match self {
            FsEvent::FileCreated { .. } => FsEventKind::FileCreated,
            FsEvent::FileRemoved { .. } => FsEventKind::FileRemoved,
            FsEvent::FileUpdated { .. } => FsEventKind::FileUpdated,
            FsEvent::DirectoryCreated { .. } => FsEventKind::DirectoryCreated,
            FsEvent::DirectoryRemoved { .. } => FsEventKind::DirectoryRemoved,
        }
    }

    /// Logical path of the changed node
    pub fn path(&self) -> &str {
        match self {
            FsEvent::FileCreated { path }
            | FsEvent::FileRemoved { path }
            | FsEvent::FileUpdated { path }
            | FsEvent::DirectoryCreated { path }
            | FsEvent::DirectoryRemoved { path } => path,
        }
    }
}

/// Event type used as a subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsEventKind {
    FileCreated,
    FileRemoved,
    FileUpdated,
    DirectoryCreated,
    DirectoryRemoved,
}

impl FsEventKind {
    pub const ALL: [FsEventKind; 5] = [
        FsEventKind::FileCreated,
        FsEventKind::FileRemoved,
        FsEventKind::FileUpdated,
        FsEventKind::DirectoryCreated,
        FsEventKind::DirectoryRemoved,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            FsEventKind::FileCreated => "file-created",
            FsEventKind::FileRemoved => "file-removed",
            FsEventKind::FileUpdated => "file-updated",
            FsEventKind::DirectoryCreated => "directory-created",
            FsEventKind::DirectoryRemoved => "directory-removed",
        }
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared flag that silences engine-originated events
///
/// Readers observe it through [`SuppressionFlag::is_active`]; only the
/// watch bridge flips it.
#[derive(Debug, Clone, Default)]
pub struct SuppressionFlag {
    active: Arc<AtomicBool>,
}

impl SuppressionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

/// Callback invoked for every event of a subscribed type
pub type EventHandler = Arc<dyn Fn(&FsEvent) + Send + Sync>;

/// Per-instance publish/subscribe channel
///
/// Handler registrations are append-only for the lifetime of the bus.
pub struct EventBus {
    handlers: DashMap<FsEventKind, Vec<EventHandler>, RandomState>,
    sender: broadcast::Sender<FsEvent>,
    suppression: SuppressionFlag,
}

impl EventBus {
    /// Create a bus with the given broadcast buffer and suppression flag
    pub fn new(capacity: usize, suppression: SuppressionFlag) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: DashMap::with_hasher(RandomState::new()),
            sender,
            suppression,
        }
    }

    /// Register a handler for one event type
    pub fn subscribe<F>(&self, kind: FsEventKind, handler: F)
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Receive every future event, regardless of type
    pub fn subscribe_all(&self) -> broadcast::Receiver<FsEvent> {
        self.sender.subscribe()
    }

    /// Every future event as a stream
    pub fn stream(&self) -> BroadcastStream<FsEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Publish an engine-originated event
    ///
    /// Returns `false` without delivering anything while suppression is active.
    pub fn publish(&self, event: FsEvent) -> bool {
        if self.suppression.is_active() {
            trace!(event = %event.kind(), path = %event.path(), "suppressed engine event");
            return false;
        }
        self.dispatch(event);
        true
    }

    /// Deliver an event unconditionally (watcher-originated events)
    pub(crate) fn dispatch(&self, event: FsEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .get(&event.kind())
            .map(|list| list.value().clone())
            .unwrap_or_default();

        for handler in &handlers {
            handler(&event);
        }

        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Number of registered handlers plus live broadcast receivers
    pub fn subscriber_count(&self) -> usize {
        let handlers: usize = self.handlers.iter().map(|entry| entry.value().len()).sum();
        handlers + self.sender.receiver_count()
    }

    pub fn suppression(&self) -> &SuppressionFlag {
        &self.suppression
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024, SuppressionFlag::default())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("suppressed", &self.suppression.is_active())
            .finish()
    }
}
