//! Target URI parsing
//!
//! Mount targets are absolute URIs of the form `scheme://authority/path`.
//! The authority is optional (`file:///var/data` has none); a missing path
//! component means the target root `/`.

use std::fmt;

use crate::error::{Result, RouterError};

/// A parsed mount target URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUri {
    pub scheme: String,
    pub authority: Option<String>,
    pub path: String,
}

impl TargetUri {
    /// Parse an absolute URI.
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = s.split_once("://").ok_or_else(|| {
            RouterError::Config(format!("Invalid target URI (missing scheme): {s}"))
        })?;

        if scheme.is_empty() || !is_valid_scheme(scheme) {
            return Err(RouterError::Config(format!(
                "Invalid target URI (bad scheme): {s}"
            )));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let path = crate::paths::normalize(path)?;

        Ok(Self {
            scheme: scheme.to_string(),
            authority: if authority.is_empty() {
                None
            } else {
                Some(authority.to_string())
            },
            path,
        })
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl fmt::Display for TargetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme,
            self.authority.as_deref().unwrap_or(""),
            self.path
        )
    }
}
