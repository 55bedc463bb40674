//! Glob restrictions narrowing the items an entry applies to

use canopy_tree::path;

use crate::error::{Error, Result};

/// Name of the glob restriction
pub const GLOB_RESTRICTION: &str = "rep:glob";

/// Glob restriction anchored at the path of an access-controlled node
///
/// - no restriction: the node and its whole subtree
/// - empty restriction: the node itself only
/// - otherwise `node_path + glob` must match the whole path, `*` matching
///   any sequence of characters including `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    node_path: String,
    restriction: Option<String>,
}

impl GlobPattern {
    pub fn new(node_path: impl Into<String>, restriction: Option<&str>) -> Self {
        Self {
            node_path: node_path.into(),
            restriction: restriction.map(str::to_string),
        }
    }

    /// Check a restriction value for syntax this matcher does not support
    pub fn validate(glob: &str) -> Result<()> {
        if let Some(ch) = glob.chars().find(|ch| matches!(ch, '[' | ']' | '?')) {
            return Err(Error::InvalidEntry(format!(
                "unsupported character {:?} in glob {:?}",
                ch, glob
            )));
        }
        Ok(())
    }

    /// Whether the item at `item_path` is covered
    pub fn matches(&self, item_path: &str) -> bool {
        if !path::is_descendant_or_equal(&self.node_path, item_path) {
            return false;
        }
        match self.restriction.as_deref() {
            None => true,
            Some("") => item_path == self.node_path,
            Some(glob) => {
                let pattern = if self.node_path == path::ROOT && glob.starts_with('/') {
                    glob.to_string()
                } else {
                    format!("{}{}", self.node_path, glob)
                };
                wildcard_match(pattern.as_bytes(), item_path.as_bytes())
            }
        }
    }
}

/// Match `candidate` against `pattern` where `*` matches any byte sequence
///
/// Runs in `O(pattern.len() * candidate.len())` at worst: only the most
/// recent `*` is ever backtracked to, since an earlier one can already absorb
/// anything a retry of it would.
fn wildcard_match(pattern: &[u8], candidate: &[u8]) -> bool {
    let (mut p, mut c) = (0, 0);
    // position after the last `*` seen, and where its match currently ends
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p + 1, c));
            p += 1;
        } else if p < pattern.len() && pattern[p] == candidate[c] {
            p += 1;
            c += 1;
        } else if let Some((after_star, matched_to)) = star {
            // let the last star swallow one more byte and retry
            p = after_star;
            c = matched_to + 1;
            star = Some((after_star, c));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_restriction_covers_subtree() {
        let glob = GlobPattern::new("/a", None);
        assert!(glob.matches("/a"));
        assert!(glob.matches("/a/b/c"));
        assert!(!glob.matches("/ab"));
        assert!(!glob.matches("/"));
    }

    #[test]
    fn test_empty_restriction_covers_node_only() {
        let glob = GlobPattern::new("/a", Some(""));
        assert!(glob.matches("/a"));
        assert!(!glob.matches("/a/b"));
    }

    #[test]
    fn test_wildcard_restriction() {
        let glob = GlobPattern::new("/a", Some("/*"));
        assert!(!glob.matches("/a"));
        assert!(glob.matches("/a/b"));
        assert!(glob.matches("/a/b/c"));

        let glob = GlobPattern::new("/a", Some("/*/cat"));
        assert!(glob.matches("/a/b/cat"));
        assert!(glob.matches("/a/b/c/cat"));
        assert!(!glob.matches("/a/b/dog"));
    }

    #[test]
    fn test_literal_suffix_restriction() {
        let glob = GlobPattern::new("/a", Some("*.txt"));
        assert!(glob.matches("/a/notes.txt"));
        assert!(!glob.matches("/a.txt"));
        assert!(!glob.matches("/a/notes.md"));
    }

    #[test]
    fn test_root_anchored_restriction() {
        let glob = GlobPattern::new("/", Some("/*/private"));
        assert!(glob.matches("/home/private"));
        assert!(!glob.matches("/home/public"));
    }

    #[test]
    fn test_many_stars_on_long_name() {
        let glob = GlobPattern::new("/", Some("/*a*a*a*a*a*a*a*a*a*a*b"));
        let long = format!("/{}", "a".repeat(40));
        assert!(!glob.matches(&long));
        assert!(glob.matches(&format!("{}b", long)));

        let stars = format!("/{}", "*a".repeat(64));
        let glob = GlobPattern::new("/x", Some(stars.as_str()));
        let candidate = format!("/x/{}", "a".repeat(4096));
        assert!(glob.matches(&candidate));
        assert!(!glob.matches(&format!("{}c", candidate)));
    }

    #[test]
    fn test_star_matches_empty_and_separators() {
        assert!(wildcard_match(b"/a*", b"/a"));
        assert!(wildcard_match(b"/a/*/c", b"/a/b/x/c"));
        assert!(wildcard_match(b"**", b""));
        assert!(!wildcard_match(b"/a*b", b"/a/c"));
        assert!(!wildcard_match(b"", b"/a"));
    }

    #[test]
    fn test_validate() {
        assert!(GlobPattern::validate("/*").is_ok());
        assert!(GlobPattern::validate("").is_ok());
        assert!(GlobPattern::validate("/[ab]").is_err());
        assert!(GlobPattern::validate("/a?").is_err());
    }
}
