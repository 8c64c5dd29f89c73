//! Backend construction and the ambient connection cache
//!
//! The registry maps implementation identifiers to async constructors. A
//! constructor both builds and validates its connection, so every
//! reachability problem surfaces while the router is being built, never on
//! first use.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::local::LocalBackend;
use crate::backend::memory::MemBackend;
use crate::backend::Backend;
use crate::config::Configuration;
use crate::error::{Result, RouterError};
use crate::uri::TargetUri;

/// Identity of a backend connection for cache lookups.
///
/// Two mount entries share a connection only when they point at the same
/// scheme, authority, and target path under the same effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub scheme: String,
    pub authority: Option<String>,
    pub path: String,
    pub config_fingerprint: u64,
}

impl BackendKey {
    pub fn for_target(uri: &TargetUri, config: &Configuration) -> Self {
        Self {
            scheme: uri.scheme.clone(),
            authority: uri.authority.clone(),
            path: uri.path.clone(),
            config_fingerprint: config.fingerprint(),
        }
    }
}

/// Future returned by a backend factory
pub type BackendFuture = BoxFuture<'static, Result<Arc<dyn Backend>>>;

/// Async constructor for one backend implementation
pub type BackendFactory = Arc<dyn Fn(TargetUri, Configuration) -> BackendFuture + Send + Sync>;

/// Registry from implementation identifier to backend constructor
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Empty registry with no implementations.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `mem` and `file` implementations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "mem",
            Arc::new(|uri: TargetUri, config: Configuration| -> BackendFuture {
                Box::pin(async move {
                    let backend = MemBackend::connect(&uri, &config).await?;
                    Ok(Arc::new(backend) as Arc<dyn Backend>)
                })
            }),
        );
        registry.register(
            "file",
            Arc::new(|uri: TargetUri, config: Configuration| -> BackendFuture {
                Box::pin(async move {
                    let backend = LocalBackend::connect(&uri, &config).await?;
                    Ok(Arc::new(backend) as Arc<dyn Backend>)
                })
            }),
        );
        registry
    }

    pub fn register(&mut self, impl_id: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(impl_id.into(), factory);
    }

    pub fn contains(&self, impl_id: &str) -> bool {
        self.factories.contains_key(impl_id)
    }

    /// Construct and validate a fresh connection to `uri`.
    pub async fn construct(
        &self,
        impl_id: &str,
        uri: &TargetUri,
        config: &Configuration,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(impl_id)
            .ok_or_else(|| RouterError::UnsupportedScheme(impl_id.to_string()))?;
        debug!("Constructing backend {impl_id} for {uri}");
        factory(uri.clone(), config.clone()).await
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Key of the process-wide ambient cache: URI identity minus the target path.
///
/// This mirrors how backend ecosystems cache instances per filesystem, not
/// per mount target, keyed by URI and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AmbientKey {
    scheme: String,
    authority: Option<String>,
}

/// Process-wide backend instance cache
///
/// Connections whose scheme differs from the router's overloaded scheme are
/// always deduplicated here, independent of any router's inner cache. The
/// cache is injectable so tests can isolate themselves from the global one.
pub struct AmbientCache {
    // Held across factory awaits so concurrent misses on the same key
    // construct at most one connection.
    connections: Mutex<HashMap<AmbientKey, Arc<dyn Backend>>>,
}

static GLOBAL_AMBIENT_CACHE: Lazy<AmbientCache> = Lazy::new(AmbientCache::new);

impl AmbientCache {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The shared process-wide instance.
    pub fn global() -> &'static AmbientCache {
        &GLOBAL_AMBIENT_CACHE
    }

    /// Look up a live connection for `uri`, constructing one through the
    /// registry on a miss.
    pub async fn get_or_connect(
        &self,
        registry: &BackendRegistry,
        uri: &TargetUri,
        config: &Configuration,
    ) -> Result<Arc<dyn Backend>> {
        let key = AmbientKey {
            scheme: uri.scheme.clone(),
            authority: uri.authority.clone(),
        };

        let mut connections = self.connections.lock().await;
        if let Some(backend) = connections.get(&key) {
            debug!("Ambient cache hit for {}://{:?}", key.scheme, key.authority);
            return Ok(backend.clone());
        }
        let backend = registry.construct(&uri.scheme, uri, config).await?;
        connections.insert(key, backend.clone());
        Ok(backend)
    }
}

impl Default for AmbientCache {
    fn default() -> Self {
        Self::new()
    }
}
