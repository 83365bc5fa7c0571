/*!
 * Existence Probe
 * Thin stat wrapper that collapses not-found into a boolean
 */

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FsError;

/// Snapshot of one node's kind at one instant; never cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStat {
    pub is_directory: bool,
    pub is_file: bool,
}

impl NodeStat {
    /// Kind of the node, if it is a regular file or a directory
    pub fn kind(&self) -> Option<NodeKind> {
        if self.is_directory {
            Some(NodeKind::Directory)
        } else if self.is_file {
            Some(NodeKind::File)
        } else {
            None
        }
    }

    #[inline]
    pub fn matches(&self, expected: NodeKind) -> bool {
        match expected {
            NodeKind::File => self.is_file,
            NodeKind::Directory => self.is_directory,
        }
    }
}

impl From<std::fs::Metadata> for NodeStat {
    fn from(md: std::fs::Metadata) -> Self {
        Self {
            is_directory: md.is_dir(),
            is_file: md.is_file(),
        }
    }
}

/// Expected node kind for existence checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeKind::File),
            "directory" => Ok(NodeKind::Directory),
            other => Err(FsError::invalid_option(
                "type",
                "enum",
                format!("expected 'file' or 'directory', got '{other}'"),
            )),
        }
    }
}

/// Stat a real path, following symlinks
pub async fn stat(real: &Path) -> io::Result<NodeStat> {
    tokio::fs::metadata(real).await.map(NodeStat::from)
}

/// Check whether a real path exists, optionally with a specific kind
///
/// Only not-found is collapsed into `false`; every other error propagates.
pub async fn path_exists(real: &Path, expected: Option<NodeKind>) -> io::Result<bool> {
    match stat(real).await {
        Ok(node) => Ok(expected.map_or(true, |kind| node.matches(kind))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
