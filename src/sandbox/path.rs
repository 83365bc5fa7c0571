/*!
 * Logical Path Handling
 * Segment-level helpers for root-relative paths
 */

use std::path::{Component, Path};

/// Separator of logical paths, independent of the host platform
pub const SEPARATOR: char = '/';

/// Split a logical path into its non-empty segments
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// True iff `path` lies strictly below `potential_parent`
///
/// Both arguments are logical paths. The comparison is per segment, so
/// `/dir10` is not considered to be within `/dir1`.
pub fn is_path_within(path: &str, potential_parent: &str) -> bool {
    let mut child = segments(path);
    for parent_segment in segments(potential_parent) {
        match child.next() {
            Some(segment) if segment == parent_segment => {}
            _ => return false,
        }
    }
    child.next().is_some()
}

/// Trim trailing separators, keeping a lone `/` intact
pub fn trim_trailing_separator(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() && !path.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Join a validated logical directory with a raw basename
///
/// The basename is appended verbatim and never re-resolved.
pub fn join_child(parent: &str, basename: &str) -> String {
    let parent = parent.trim_end_matches(SEPARATOR);
    let mut child = String::with_capacity(parent.len() + basename.len() + 1);
    child.push_str(parent);
    child.push(SEPARATOR);
    child.push_str(basename);
    child
}

/// Build a logical path from a root-relative host path
///
/// Returns `None` when a component is not valid UTF-8 or is anything other
/// than a normal name.
pub fn logical_from_relative(relative: &Path) -> Option<String> {
    let mut logical = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                logical.push(SEPARATOR);
                logical.push_str(name.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if logical.is_empty() {
        logical.push(SEPARATOR);
    }
    Some(logical)
}
