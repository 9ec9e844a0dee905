//! Path grammar for the per-user document tree.
//!
//! A path is a `/`-separated sequence of non-empty segments. A trailing
//! slash marks a directory; the empty string is the root directory.
//! Documents never end in a slash. Segments must not be `.` or `..` and
//! must not contain NUL.

use crate::error::{Error, Result};

/// Returns true when `path` names a directory (root or slash-terminated).
pub fn is_directory(path: &str) -> bool {
    path.is_empty() || path.ends_with('/')
}

fn segment_ok(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\0')
}

/// Validates a document path: non-empty, no trailing slash, legal segments.
pub fn validate_document(path: &str) -> Result<()> {
    if path.is_empty() || path.ends_with('/') {
        return Err(Error::UnsupportedRequest(format!(
            "not a document path: {path:?}"
        )));
    }
    if path.split('/').all(segment_ok) {
        Ok(())
    } else {
        Err(Error::UnsupportedRequest(format!(
            "invalid segment in path: {path:?}"
        )))
    }
}

/// Validates a directory path: the root, or slash-terminated with legal
/// segments.
pub fn validate_directory(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    let Some(inner) = path.strip_suffix('/') else {
        return Err(Error::UnsupportedRequest(format!(
            "not a directory path: {path:?}"
        )));
    };
    if inner.split('/').all(segment_ok) {
        Ok(())
    } else {
        Err(Error::UnsupportedRequest(format!(
            "invalid segment in path: {path:?}"
        )))
    }
}

/// Parent directory of a document or directory path. The parent of a
/// top-level entry is the root (`""`).
pub fn parent_of(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Final segment of a path. Directories keep their trailing slash, so the
/// result is exactly the name under which the entry appears in its
/// parent's children set.
pub fn leaf_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// All ancestor directories of `path`, nearest first, ending with the
/// root. The root itself has no ancestors.
pub fn ancestor_chain(path: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    let mut current = path;
    while !current.is_empty() {
        current = parent_of(current);
        chain.push(current);
    }
    chain
}

/// Joins a directory path and an entry name.
pub fn join(directory: &str, name: &str) -> String {
    format!("{directory}{name}")
}
