//! Configuration parsing and structures
//!
//! The router consumes a flat set of string key/value pairs, loadable from a
//! YAML mapping. Well-known keys:
//!
//! - `mount.link.<authority>.<prefix> = <target-uri>` (repeatable)
//! - `mount.linkFallback.<authority> = <target-uri>` (at most one)
//! - `overloaded-scheme.target-impl.<scheme> = <implementation-id>`
//! - `enable-inner-cache = <bool>` (default true)

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::error::{Result, RouterError};

/// Key prefix for per-authority mount links.
pub const MOUNT_LINK_PREFIX: &str = "mount.link.";

/// Key prefix for the per-authority fallback link.
pub const LINK_FALLBACK_PREFIX: &str = "mount.linkFallback.";

/// Key prefix mapping an overloaded scheme to its target implementation.
pub const TARGET_IMPL_PREFIX: &str = "overloaded-scheme.target-impl.";

/// Toggle for the router-local inner connection cache.
pub const ENABLE_INNER_CACHE: &str = "enable-inner-cache";

/// Router URI for the standalone binary.
pub const ROUTER_URI: &str = "router.uri";

/// Log filter used by the standalone binary.
pub const LOGGING_LEVEL: &str = "logging.level";

/// Flat key/value configuration consumed by the router core.
///
/// Ordered map so the fingerprint is stable across construction order.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file containing a string mapping.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RouterError::Config(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string mapping.
    pub fn from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| RouterError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.trim(), "true" | "TRUE" | "True" | "1"),
            None => default,
        }
    }

    /// Add a mount link for an authority: `prefix -> target`.
    pub fn add_link(&mut self, authority: &str, prefix: &str, target: &str) {
        self.set(format!("{MOUNT_LINK_PREFIX}{authority}.{prefix}"), target);
    }

    /// Set the fallback link for an authority.
    pub fn add_link_fallback(&mut self, authority: &str, target: &str) {
        self.set(format!("{LINK_FALLBACK_PREFIX}{authority}"), target);
    }

    /// Declare which implementation backs a scheme when that scheme is the
    /// one being overloaded by the router itself.
    pub fn set_target_impl(&mut self, scheme: &str, impl_id: &str) {
        self.set(format!("{TARGET_IMPL_PREFIX}{scheme}"), impl_id);
    }

    pub fn set_enable_inner_cache(&mut self, enabled: bool) {
        self.set(ENABLE_INNER_CACHE, enabled.to_string());
    }

    pub fn enable_inner_cache(&self) -> bool {
        self.get_bool(ENABLE_INNER_CACHE, true)
    }

    pub fn target_impl(&self, scheme: &str) -> Option<&str> {
        self.get(&format!("{TARGET_IMPL_PREFIX}{scheme}"))
    }

    /// All configured `(prefix, target)` links for an authority.
    pub fn links(&self, authority: &str) -> Vec<(String, String)> {
        let key_prefix = format!("{MOUNT_LINK_PREFIX}{authority}.");
        self.values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&key_prefix)
                    .map(|prefix| (prefix.to_string(), v.clone()))
            })
            .collect()
    }

    /// The fallback target for an authority, if configured.
    pub fn link_fallback(&self, authority: &str) -> Option<&str> {
        self.get(&format!("{LINK_FALLBACK_PREFIX}{authority}"))
    }

    /// Stable hash over the whole configuration.
    ///
    /// Two mount entries share a backend connection only if their effective
    /// configuration is identical, so the fingerprint participates in
    /// connection-cache key equality.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (k, v) in &self.values {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        hasher.finish()
    }
}
