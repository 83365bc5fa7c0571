/*!
 * Change Debouncer
 * Coalesces bursts of modifications and folds a creation's own writes into it
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Open creation burst for one path
#[derive(Debug, Clone, Copy)]
struct CreationWindow {
    opened: Instant,
    last_write: Instant,
}

impl CreationWindow {
    fn is_open(&self, now: Instant, quiet: Duration, grace: Duration) -> bool {
        now.duration_since(self.opened) < grace && now.duration_since(self.last_write) < quiet
    }
}

/// Debounces modification events by path.
///
/// A creation opens a window that absorbs the writes belonging to it. The
/// window closes when the writer closes the file, when the burst has been
/// quiet for the debounce duration, or when the grace period runs out.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending modifications: path -> last change timestamp
    pending: HashMap<PathBuf, Instant>,
    /// Open creation windows
    created: HashMap<PathBuf, CreationWindow>,
    /// How long a path must be quiet before its modification is reported
    quiet: Duration,
    /// Upper bound on how long a creation window stays open
    grace: Duration,
}

impl Debouncer {
    pub fn new(debounce_ms: u64, created_grace_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            created: HashMap::new(),
            quiet: Duration::from_millis(debounce_ms),
            grace: Duration::from_millis(created_grace_ms),
        }
    }

    /// Note that a path was just created
    pub fn record_created(&mut self, path: PathBuf) {
        let now = Instant::now();
        self.pending.remove(&path);
        self.created.insert(
            path,
            CreationWindow {
                opened: now,
                last_write: now,
            },
        );
    }

    /// Record a modification, returning `false` when it folds into a creation
    pub fn record_modified(&mut self, path: PathBuf) -> bool {
        let now = Instant::now();
        let (quiet, grace) = (self.quiet, self.grace);
        if let Some(window) = self.created.get_mut(&path) {
            if window.is_open(now, quiet, grace) {
                window.last_write = now;
                return false;
            }
            self.created.remove(&path);
        }
        self.pending.insert(path, now);
        true
    }

    /// The writer closed the file; later writes are modifications
    pub fn record_closed(&mut self, path: &Path) {
        self.created.remove(path);
    }

    /// Forget a path (e.g., when it is removed)
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
        self.created.remove(path);
    }

    /// Take all paths that have been quiet for the debounce duration
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let (quiet, grace) = (self.quiet, self.grace);
        self.created
            .retain(|_, window| window.is_open(now, quiet, grace));

        let mut ready = Vec::new();
        self.pending.retain(|path, last_change| {
            if now.duration_since(*last_change) >= quiet {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
