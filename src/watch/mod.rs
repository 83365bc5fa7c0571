/*!
 * Watch Subsystem
 * External subtree watching bridged onto the event bus
 *
 * ```text
 * NotifyTreeWatch (notify + initial scan)
 *         | add / addDir / unlink / unlinkDir / change  (real paths)
 *         v
 *   WatchBridge  -- owns -->  SuppressionFlag  <-- reads --  SandboxFs
 *         | FsEvent (logical paths)
 *         v
 *     EventBus
 * ```
 */

mod bridge;
mod debouncer;
mod error;
mod local;
mod tree;

pub use bridge::WatchBridge;
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use local::NotifyTreeWatch;
pub use tree::{TreeChange, TreeSubscription, TreeWatch, TreeWatchEvent};
