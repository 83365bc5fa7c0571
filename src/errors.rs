/*!
 * Error Types
 * Typed failures for sandboxed filesystem operations
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::watch::WatchError;

/// Result of a sandboxed filesystem operation
///
/// # Must Use
/// Filesystem operations can fail and must be handled to prevent data loss
#[must_use = "filesystem operations can fail and must be handled"]
pub type FsResult<T> = Result<T, FsError>;

/// Errors returned by every operation on a [`crate::SandboxFs`]
///
/// Paths carried by the variants are always logical paths. The real root
/// never appears in an error message.
#[derive(Error, Debug, Diagnostic)]
pub enum FsError {
    #[error("Invalid option '{option}' ({kind}): {message}")]
    #[diagnostic(
        code(sandbox_fs::invalid_option),
        help("The argument was rejected before any I/O was attempted.")
    )]
    InvalidOption {
        option: String,
        kind: String,
        message: String,
    },

    #[error("Path already exists: {path}")]
    #[diagnostic(code(sandbox_fs::path_exists))]
    PathExists { path: String },

    #[error("Path does not exist: {path}")]
    #[diagnostic(code(sandbox_fs::path_does_not_exist))]
    PathDoesNotExist { path: String },

    #[error("Path is a directory: {path}")]
    #[diagnostic(code(sandbox_fs::path_is_directory))]
    PathIsDirectory { path: String },

    #[error("Path is not a directory: {path}")]
    #[diagnostic(code(sandbox_fs::path_is_not_directory))]
    PathIsNotDirectory { path: String },

    #[error("Illegal path: {path}")]
    #[diagnostic(
        code(sandbox_fs::illegal_path),
        help("The path resolves outside the sandbox root. Audit the caller instead of retrying.")
    )]
    IllegalPath { path: String },

    #[error("Read-only filesystem: {operation} is not permitted")]
    #[diagnostic(code(sandbox_fs::read_only))]
    ReadOnly { operation: &'static str },

    #[error(transparent)]
    #[diagnostic(code(sandbox_fs::watch))]
    Watch(#[from] WatchError),

    #[error(transparent)]
    #[diagnostic(code(sandbox_fs::io))]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`FsError`] for callers that branch on the failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsErrorKind {
    InvalidOption,
    PathExists,
    PathDoesNotExist,
    PathIsDirectory,
    PathIsNotDirectory,
    IllegalPath,
    ReadOnly,
    Watch,
    Io,
}

impl FsError {
    pub fn invalid_option(
        option: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        FsError::InvalidOption {
            option: option.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn path_exists(path: impl Into<String>) -> Self {
        FsError::PathExists { path: path.into() }
    }

    pub fn path_does_not_exist(path: impl Into<String>) -> Self {
        FsError::PathDoesNotExist { path: path.into() }
    }

    pub fn path_is_directory(path: impl Into<String>) -> Self {
        FsError::PathIsDirectory { path: path.into() }
    }

    pub fn path_is_not_directory(path: impl Into<String>) -> Self {
        FsError::PathIsNotDirectory { path: path.into() }
    }

    pub fn illegal_path(path: impl Into<String>) -> Self {
        FsError::IllegalPath { path: path.into() }
    }

    /// Kind tag of this error
    #[must_use]
    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::InvalidOption { .. } => FsErrorKind::InvalidOption,
            FsError::PathExists { .. } => FsErrorKind::PathExists,
            FsError::PathDoesNotExist { .. } => FsErrorKind::PathDoesNotExist,
            FsError::PathIsDirectory { .. } => FsErrorKind::PathIsDirectory,
            FsError::PathIsNotDirectory { .. } => FsErrorKind::PathIsNotDirectory,
            FsError::IllegalPath { .. } => FsErrorKind::IllegalPath,
            FsError::ReadOnly { .. } => FsErrorKind::ReadOnly,
            FsError::Watch(_) => FsErrorKind::Watch,
            FsError::Io(_) => FsErrorKind::Io,
        }
    }

    /// Logical path the error refers to, if any
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            FsError::PathExists { path }
            | FsError::PathDoesNotExist { path }
            | FsError::PathIsDirectory { path }
            | FsError::PathIsNotDirectory { path }
            | FsError::IllegalPath { path } => Some(path),
            _ => None,
        }
    }

    /// Whether this error indicates an attempted escape from the root
    #[inline]
    #[must_use]
    pub fn is_security_violation(&self) -> bool {
        matches!(self, FsError::IllegalPath { .. })
    }
}
