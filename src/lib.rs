/*!
 * Sandbox FS Library
 * Root-confined filesystem operations with change notifications
 *
 * ```no_run
 * # async fn demo() -> sandbox_fs::FsResult<()> {
 * use sandbox_fs::{FsEventKind, SandboxFs};
 *
 * let fs = SandboxFs::new("/srv/workspace")?;
 * fs.subscribe(FsEventKind::FileCreated, |event| println!("{}", event.path()));
 * fs.create_file("/notes/today.md", "hello").await?;
 * assert_eq!(fs.read_file("/notes/today.md").await?, b"hello");
 * # Ok(())
 * # }
 * ```
 */

pub mod config;
pub mod delegate;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod probe;
pub mod sandbox;
pub mod watch;

// Re-exports
pub use config::{FsConfig, WatchConfig};
pub use delegate::{BulkOps, LocalBulkOps};
pub use engine::{DirEntry, SandboxFs, SandboxFsBuilder};
pub use errors::{FsError, FsErrorKind, FsResult};
pub use events::{EventBus, EventHandler, FsEvent, FsEventKind, SuppressionFlag};
pub use logging::init_tracing;
pub use probe::{NodeKind, NodeStat};
pub use sandbox::{is_path_within, PathSandbox, ResolvedPath};
pub use watch::{
    NotifyTreeWatch, TreeChange, TreeSubscription, TreeWatch, TreeWatchEvent, WatchBridge,
    WatchError,
};
