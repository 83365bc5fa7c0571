/*!
 * Watcher Errors
 */

use miette::Diagnostic;
use thiserror::Error;

/// Errors from starting or running a tree watcher
#[derive(Error, Debug, Diagnostic)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    #[diagnostic(code(sandbox_fs::watch::init_failed))]
    InitFailed { reason: String },

    #[error("Initial scan failed: {reason}")]
    #[diagnostic(code(sandbox_fs::watch::scan_failed))]
    ScanFailed { reason: String },

    #[error("Watcher stream closed before it became ready")]
    #[diagnostic(
        code(sandbox_fs::watch::closed),
        help("The underlying watcher stopped during the initial scan.")
    )]
    ClosedBeforeReady,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
