//! Helpers for absolute, slash separated item paths
//!
//! Paths are plain strings: the root is `/`, every other path starts with `/`
//! and has no empty segments and no trailing slash.

use crate::error::{Result, TreeError};

/// Path of the root node
pub const ROOT: &str = "/";

/// Check that a path is absolute and well formed
pub fn validate(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(TreeError::InvalidPath(format!("not absolute: {}", path)));
    }
    if path[1..].split('/').any(|segment| segment.is_empty()) {
        return Err(TreeError::InvalidPath(format!("empty segment: {}", path)));
    }
    Ok(())
}

/// Check that a single name is usable as a path segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(TreeError::InvalidPath(format!("invalid name: {:?}", name)));
    }
    Ok(())
}

/// Parent of a path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Ancestor `levels` steps above the path (`0` is the path itself)
pub fn ancestor(path: &str, levels: usize) -> Option<&str> {
    let mut current = path;
    for _ in 0..levels {
        current = parent(current)?;
    }
    Some(current)
}

/// Last segment of a path, empty for the root
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Append a name to a path
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Whether `path` equals `ancestor` or lies below it
pub fn is_descendant_or_equal(ancestor: &str, path: &str) -> bool {
    if ancestor == ROOT {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Number of segments below the root
pub fn depth(path: &str) -> usize {
    if path == ROOT {
        0
    } else {
        path.matches('/').count()
    }
}
