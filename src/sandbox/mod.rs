/*!
 * Path Sandbox
 * Translates logical paths to real paths confined to a single root
 */

pub mod path;

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::{FsError, FsResult};

pub use path::is_path_within;

/// A logical path that passed containment checks, paired with its real path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    logical: String,
    real: PathBuf,
}

impl ResolvedPath {
    /// Normalized logical path, always starting with `/`
    #[inline]
    pub fn logical(&self) -> &str {
        &self.logical
    }

    #[inline]
    pub(crate) fn real(&self) -> &Path {
        &self.real
    }

    /// Whether this is the sandbox root itself
    #[inline]
    pub fn is_root(&self) -> bool {
        self.logical == "/"
    }

    /// Last segment of the logical path (empty for the root)
    pub fn basename(&self) -> &str {
        self.logical
            .rsplit(path::SEPARATOR)
            .next()
            .unwrap_or_default()
    }
}

/// Root-confined path resolver
///
/// The root is canonicalized once at construction and never changes.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox over an existing directory
    pub fn new<P: AsRef<Path>>(root: P) -> FsResult<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            return Err(FsError::invalid_option(
                "root",
                "absolute",
                "root must be an absolute path",
            ));
        }

        let canonical = root.canonicalize().map_err(|e| {
            FsError::invalid_option("root", "exists", format!("root is not accessible: {e}"))
        })?;
        if !canonical.is_dir() {
            return Err(FsError::invalid_option(
                "root",
                "directory",
                "root must be a directory",
            ));
        }

        Ok(Self { root: canonical })
    }

    #[inline]
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path; the root itself is a valid result
    ///
    /// An empty string is rejected.
    pub fn resolve(&self, logical: &str) -> FsResult<ResolvedPath> {
        self.resolve_inner(logical, false)
    }

    /// Resolve a logical path to a node strictly below the root
    ///
    /// Used for mutations, which never address the root itself.
    pub fn resolve_entry(&self, logical: &str) -> FsResult<ResolvedPath> {
        let resolved = self.resolve_inner(logical, false)?;
        if resolved.is_root() {
            return Err(self.reject(logical));
        }
        Ok(resolved)
    }

    /// Resolve a logical path for whole-root access such as listing
    ///
    /// An empty string maps to the root.
    pub fn resolve_listing(&self, logical: &str) -> FsResult<ResolvedPath> {
        self.resolve_inner(logical, true)
    }

    fn resolve_inner(&self, logical: &str, allow_empty: bool) -> FsResult<ResolvedPath> {
        if logical.is_empty() && !allow_empty {
            return Err(FsError::invalid_option(
                "path",
                "required",
                "path must be a non-empty string",
            ));
        }
        if logical.contains('\0') {
            return Err(FsError::invalid_option(
                "path",
                "invalid",
                "path cannot contain null bytes",
            ));
        }

        let relative = logical.trim_start_matches(path::SEPARATOR);
        let joined = self.root.join(relative);
        let cleaned = PathBuf::from(path_clean::clean(&joined));

        // Component-wise check after normalization, so `..` that stays inside passes
        let Ok(inside) = cleaned.strip_prefix(&self.root) else {
            return Err(self.reject(logical));
        };
        let Some(normalized) = path::logical_from_relative(inside) else {
            return Err(self.reject(logical));
        };

        Ok(ResolvedPath {
            logical: normalized,
            real: cleaned,
        })
    }

    /// Verify that symlinks along a resolved path do not lead out of the root
    ///
    /// Canonicalizes the nearest existing ancestor of the real path.
    pub async fn confine(&self, resolved: &ResolvedPath) -> FsResult<()> {
        let mut candidate = resolved.real();
        loop {
            match tokio::fs::canonicalize(candidate).await {
                Ok(canonical) => {
                    if canonical.starts_with(&self.root) {
                        return Ok(());
                    }
                    return Err(self.reject(resolved.logical()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match candidate.parent() {
                    Some(parent) if parent.starts_with(&self.root) => candidate = parent,
                    _ => return Err(self.reject(resolved.logical())),
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Map a real path reported by the host back into logical space
    ///
    /// Returns `None` for paths outside the root.
    pub fn to_logical(&self, real: &Path) -> Option<String> {
        let relative = real.strip_prefix(&self.root).ok()?;
        path::logical_from_relative(relative)
    }

    fn reject(&self, logical: &str) -> FsError {
        warn!(target: "sandbox_fs::audit", path = %logical, "rejected path not confined below sandbox root");
        FsError::illegal_path(logical)
    }
}
