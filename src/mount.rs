//! Mount table construction and path resolution
//!
//! A mount table is a per-authority set of prefix -> target-URI links plus an
//! optional fallback link. It is built once from configuration and never
//! mutated afterward; re-mounting means constructing a new router.

use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::config::Configuration;
use crate::error::{Result, RouterError};
use crate::paths;
use crate::uri::TargetUri;

/// One prefix -> target binding
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// Absolute, normalized prefix; `/` only for the fallback entry.
    pub prefix: String,
    pub target: TargetUri,
    pub is_fallback: bool,
}

/// Result of resolving a logical path against the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The namespace root: synthetic, never delegated to a backend.
    Root,
    /// A mount link matched. `index` addresses `entries()`; the fallback
    /// link uses `entries().len()`.
    Link { index: usize, remapped: String },
}

/// Immutable per-authority mount table
#[derive(Debug)]
pub struct MountTable {
    authority: String,
    entries: Vec<MountEntry>,
    fallback: Option<MountEntry>,
}

impl MountTable {
    /// Build the mount table for one authority from configuration.
    pub fn build(authority: &str, config: &Configuration) -> Result<Self> {
        let links = config.links(authority);
        let fallback_target = config.link_fallback(authority);

        if links.is_empty() && fallback_target.is_none() {
            return Err(RouterError::Config(format!(
                "Mount table for authority '{authority}' has no links and no fallback"
            )));
        }

        let mut entries = Vec::with_capacity(links.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (raw_prefix, target) in links {
            let prefix = paths::normalize(&raw_prefix).map_err(|e| {
                RouterError::Config(format!("Invalid mount prefix '{raw_prefix}': {e}"))
            })?;
            if prefix == "/" {
                return Err(RouterError::Config(format!(
                    "Mount prefix must not be the root (authority '{authority}'); \
                     use a fallback link instead"
                )));
            }
            if !seen.insert(prefix.clone()) {
                return Err(RouterError::Config(format!(
                    "Duplicate mount prefix '{prefix}' for authority '{authority}'"
                )));
            }
            entries.push(MountEntry {
                prefix,
                target: TargetUri::parse(&target)?,
                is_fallback: false,
            });
        }

        // Longest prefix first: a segment-prefix of the path that spans more
        // segments is always the longer string.
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let fallback = fallback_target
            .map(|target| {
                Ok::<_, RouterError>(MountEntry {
                    prefix: "/".to_string(),
                    target: TargetUri::parse(target)?,
                    is_fallback: true,
                })
            })
            .transpose()?;

        info!(
            "Built mount table for authority '{authority}': {} links, fallback={}",
            entries.len(),
            fallback.is_some()
        );

        Ok(Self {
            authority: authority.to_string(),
            entries,
            fallback,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> Option<&MountEntry> {
        self.fallback.as_ref()
    }

    /// Entry addressed by a `Resolved::Link` index.
    pub fn entry(&self, index: usize) -> Option<&MountEntry> {
        if index == self.entries.len() {
            self.fallback.as_ref()
        } else {
            self.entries.get(index)
        }
    }

    /// Distinct first path segments among configured prefixes.
    ///
    /// The fallback never contributes a segment.
    pub fn top_level_names(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| paths::first_segment(&e.prefix))
            .map(str::to_string)
            .collect()
    }

    /// Resolve a logical path to a mount link and a remapped target path.
    pub fn resolve(&self, path: &str) -> Result<Resolved> {
        let path = paths::normalize(path)?;
        if path == "/" {
            return Ok(Resolved::Root);
        }

        for (index, entry) in self.entries.iter().enumerate() {
            if paths::is_segment_prefix(&entry.prefix, &path) {
                let remainder = &path[entry.prefix.len()..];
                return Ok(Resolved::Link {
                    index,
                    remapped: paths::join(&entry.target.path, remainder),
                });
            }
        }

        if let Some(fallback) = &self.fallback {
            // The fallback preserves the full logical path under its target.
            return Ok(Resolved::Link {
                index: self.entries.len(),
                remapped: paths::join(&fallback.target.path, &path),
            });
        }

        Err(RouterError::NotInMountpoint(path))
    }
}
