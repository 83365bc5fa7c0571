/*!
 * I/O Delegates
 * Bulk filesystem services consumed by the operation engine
 */

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Classification of a delegate failure, matched by the engine on its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    NotFound,
    AlreadyExists,
    IsDirectory,
    NotDirectory,
    Other,
}

impl IoFailure {
    /// Classify a raw I/O error
    pub fn of(e: &io::Error) -> Self {
        use io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => IoFailure::NotFound,
            ErrorKind::AlreadyExists => IoFailure::AlreadyExists,
            ErrorKind::IsADirectory => IoFailure::IsDirectory,
            ErrorKind::NotADirectory => IoFailure::NotDirectory,
            _ => IoFailure::Other,
        }
    }
}

/// Recursive copy, recursive delete and directory creation
///
/// Every method takes real paths that already passed containment checks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BulkOps: Send + Sync {
    /// Copy a file or directory tree to `dst`, which must not exist
    ///
    /// All-or-nothing: on failure nothing is left at `dst`.
    async fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Delete a file or directory tree
    async fn remove_tree(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and any missing ancestors; idempotent
    async fn ensure_dir(&self, path: &Path) -> io::Result<()>;
}

/// Bulk operations on the host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBulkOps;

#[async_trait]
impl BulkOps for LocalBulkOps {
    async fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dst))
            .await
            .map_err(io::Error::other)?
    }

    async fn remove_tree(&self, path: &Path) -> io::Result<()> {
        let md = tokio::fs::symlink_metadata(path).await?;
        if md.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}

fn copy_tree_blocking(src: &Path, dst: &Path) -> io::Result<()> {
    copy_tree_with(src, dst, |path, perms| fs::set_permissions(path, perms))
}

/// Permission step applied to every created directory and file
type ApplyPermissions = fn(&Path, fs::Permissions) -> io::Result<()>;

fn copy_tree_with(src: &Path, dst: &Path, apply: ApplyPermissions) -> io::Result<()> {
    // Source must exist before anything is created at the destination
    fs::symlink_metadata(src)?;

    match copy_entries(src, dst, apply) {
        Ok(copied) => {
            debug!(entries = copied, "tree copy complete");
            Ok(())
        }
        Err(CopyFailure { error, created }) => {
            if created {
                rollback(dst);
            }
            Err(error)
        }
    }
}

struct CopyFailure {
    error: io::Error,
    /// Whether anything was created at the destination before the failure
    created: bool,
}

fn copy_entries(src: &Path, dst: &Path, apply: ApplyPermissions) -> Result<usize, CopyFailure> {
    let mut copied = 0usize;
    let mut created = false;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                return Err(CopyFailure {
                    error: e.into(),
                    created,
                })
            }
        };
        let target = destination_for(src, dst, entry.path());
        if let Err(error) = copy_entry(&entry, &target, apply, &mut created) {
            return Err(CopyFailure { error, created });
        }
        copied += 1;
    }
    Ok(copied)
}

fn destination_for(src: &Path, dst: &Path, entry: &Path) -> PathBuf {
    match entry.strip_prefix(src) {
        Ok(relative) if !relative.as_os_str().is_empty() => dst.join(relative),
        _ => dst.to_path_buf(),
    }
}

/// Copy one entry; `created` is set as soon as the target exists
fn copy_entry(
    entry: &walkdir::DirEntry,
    target: &Path,
    apply: ApplyPermissions,
    created: &mut bool,
) -> io::Result<()> {
    let file_type = entry.file_type();
    if file_type.is_dir() {
        fs::create_dir(target)?;
        *created = true;
        let perms = entry.metadata().map_err(io::Error::from)?.permissions();
        apply(target, perms)
    } else if file_type.is_symlink() {
        copy_symlink(entry.path(), target, apply, created)
    } else {
        copy_file_exclusive(entry.path(), target, apply, created)
    }
}

fn copy_file_exclusive(
    src: &Path,
    target: &Path,
    apply: ApplyPermissions,
    created: &mut bool,
) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)?;
    *created = true;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    apply(target, reader.metadata()?.permissions())
}

#[cfg(unix)]
fn copy_symlink(
    src: &Path,
    target: &Path,
    _apply: ApplyPermissions,
    created: &mut bool,
) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, target)?;
    *created = true;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(
    src: &Path,
    target: &Path,
    apply: ApplyPermissions,
    created: &mut bool,
) -> io::Result<()> {
    copy_file_exclusive(src, target, apply, created)
}

fn rollback(dst: &Path) {
    let result = match fs::symlink_metadata(dst) {
        Ok(md) if md.is_dir() => fs::remove_dir_all(dst),
        Ok(_) => fs::remove_file(dst),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(error = %e, "failed to roll back partial copy");
    }
}
