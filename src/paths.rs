//! Logical path helpers
//!
//! Logical paths are URI-style: absolute, `/`-separated, independent of the
//! host OS. Backends receive already-remapped logical paths.

use crate::error::{Result, RouterError};

/// Normalize a logical path to an absolute, segment-clean form.
///
/// Collapses repeated separators, resolves `.` and `..` segments, and strips
/// any trailing separator. The root normalizes to `/`. Relative paths and
/// paths that escape the root are rejected.
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(RouterError::InvalidPath(format!(
            "path must be absolute: {path}"
        )));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(RouterError::InvalidPath(format!(
                        "path escapes the root: {path}"
                    )));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Join a target base path with an already-normalized absolute remainder.
///
/// The remainder is either empty (the path hit the prefix exactly) or starts
/// with `/`.
pub fn join(base: &str, remainder: &str) -> String {
    let base = base.trim_end_matches('/');
    if remainder.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}{remainder}")
    }
}

/// Last segment of a normalized path; the root has no name.
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// First segment of a normalized non-root path.
pub fn first_segment(path: &str) -> Option<&str> {
    path.strip_prefix('/')
        .and_then(|rest| rest.split('/').next())
        .filter(|s| !s.is_empty())
}

/// Whether `prefix` is a path-segment prefix of `path`.
///
/// `/local` matches `/local` and `/local/x` but never `/localX`.
pub fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("//").unwrap(), "/");
        assert_eq!(normalize("/a/b").unwrap(), "/a/b");
        assert_eq!(normalize("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize("/a/./b").unwrap(), "/a/b");
        assert_eq!(normalize("/a/b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn test_normalize_rejects_relative() {
        assert!(normalize("a/b").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(normalize("/..").is_err());
        assert!(normalize("/a/../..").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/x", "/f"), "/x/f");
        assert_eq!(join("/x/", "/f"), "/x/f");
        assert_eq!(join("/x", ""), "/x");
        assert_eq!(join("/", "/f"), "/f");
        assert_eq!(join("/", ""), "/");
    }

    #[test]
    fn test_segment_prefix() {
        assert!(is_segment_prefix("/local", "/local"));
        assert!(is_segment_prefix("/local", "/local/x"));
        assert!(!is_segment_prefix("/local", "/localX"));
        assert!(!is_segment_prefix("/local", "/loc"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/a/b/c"), "c");
        assert_eq!(file_name("/a"), "a");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("/a/b"), Some("a"));
        assert_eq!(first_segment("/a"), Some("a"));
        assert_eq!(first_segment("/"), None);
    }
}
