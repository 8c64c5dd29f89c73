//! Router facade
//!
//! The object callers use. Owns a mount table, the per-entry backend
//! connections, and the router-local inner cache. Construction is eager and
//! fail-fast: every configured mount target (and the fallback, if present)
//! is connected and validated up front, so a router with one bad link never
//! comes up at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::registry::{AmbientCache, BackendKey, BackendRegistry};
use crate::backend::{Backend, ByteStream, FileStatus, FileStatusStream};
use crate::config::Configuration;
use crate::error::{Result, RouterError};
use crate::mount::{MountEntry, MountTable, Resolved};
use crate::root;
use crate::uri::TargetUri;

/// One live backend connection serving a mount entry.
struct MountConnection {
    backend: Arc<dyn Backend>,
    /// Whether this router constructed (and therefore closes) the
    /// connection. Ambient-cached connections belong to the ambient owner.
    owned: bool,
}

/// Router-local connection cache for overloaded-scheme targets.
///
/// The lock is held across backend construction so two concurrent misses on
/// one key construct at most one connection.
type InnerCache = Mutex<HashMap<BackendKey, Arc<dyn Backend>>>;

/// Virtual filesystem router
///
/// Presents one logical namespace backed by the mount table. Safe to share
/// across tasks: the table and connection list are immutable after
/// construction.
pub struct Router {
    scheme: String,
    authority: String,
    table: MountTable,
    /// Parallel to `table.entries()`, fallback connection last.
    connections: Vec<MountConnection>,
    /// Deduplication map for overloaded-scheme connections; `None` when the
    /// inner cache is disabled by configuration.
    inner_cache: Option<InnerCache>,
    closed: parking_lot::Mutex<bool>,
}

impl Router {
    /// Construct a router bound to `router_uri` (`scheme://authority`) using
    /// the built-in backend registry and the process-wide ambient cache.
    pub async fn new(router_uri: &str, config: Configuration) -> Result<Self> {
        Self::with_registry(
            router_uri,
            config,
            &BackendRegistry::default(),
            AmbientCache::global(),
        )
        .await
    }

    /// Construct a router with an explicit registry and ambient cache.
    pub async fn with_registry(
        router_uri: &str,
        config: Configuration,
        registry: &BackendRegistry,
        ambient: &AmbientCache,
    ) -> Result<Self> {
        let uri = TargetUri::parse(router_uri)?;
        let authority = uri.authority.clone().ok_or_else(|| {
            RouterError::Config(format!("Router URI must carry an authority: {router_uri}"))
        })?;

        let table = MountTable::build(&authority, &config)?;

        let inner_cache: Option<InnerCache> = if config.enable_inner_cache() {
            Some(Mutex::new(HashMap::new()))
        } else {
            None
        };

        // Eagerly connect every link and the fallback. Any failure aborts
        // construction; no partial router is ever returned.
        let mut connections = Vec::with_capacity(table.entries().len() + 1);
        let linked: Vec<&MountEntry> = table.entries().iter().chain(table.fallback()).collect();
        for entry in linked {
            let connection = Self::connect_entry(
                &uri.scheme,
                entry,
                &config,
                registry,
                ambient,
                inner_cache.as_ref(),
            )
            .await?;
            connections.push(connection);
        }

        let router = Self {
            scheme: uri.scheme,
            authority,
            table,
            connections,
            inner_cache,
            closed: parking_lot::Mutex::new(false),
        };
        info!(
            "Router {}://{} up: {} mount links, {} live connections",
            router.scheme,
            router.authority,
            router.table.entries().len(),
            router.child_connections().len()
        );
        Ok(router)
    }

    async fn connect_entry(
        overloaded_scheme: &str,
        entry: &MountEntry,
        config: &Configuration,
        registry: &BackendRegistry,
        ambient: &AmbientCache,
        inner_cache: Option<&InnerCache>,
    ) -> Result<MountConnection> {
        let target = &entry.target;

        if target.scheme != overloaded_scheme {
            // Cross-scheme targets keep benefiting from the ambient cache
            // regardless of the inner-cache toggle.
            let backend = ambient.get_or_connect(registry, target, config).await?;
            // An ambient hit skips the constructor, so this entry's own
            // target path still gets checked before the router comes up.
            backend.verify_target(&target.path).await?;
            return Ok(MountConnection {
                backend,
                owned: false,
            });
        }

        // Same scheme as the router itself: the overloaded scheme no longer
        // names its original implementation, so the target implementation
        // comes from configuration.
        let impl_id = config.target_impl(&target.scheme).ok_or_else(|| {
            RouterError::UnsupportedScheme(format!(
                "{} (no target implementation configured for the overloaded scheme)",
                target.scheme
            ))
        })?;

        let backend = match inner_cache {
            Some(cache) => {
                let key = BackendKey::for_target(target, config);
                let mut map = cache.lock().await;
                match map.get(&key) {
                    Some(backend) => {
                        debug!("Inner cache hit for {target}");
                        backend.clone()
                    }
                    None => {
                        let backend = registry.construct(impl_id, target, config).await?;
                        map.insert(key, backend.clone());
                        backend
                    }
                }
            }
            // Inner cache disabled: every same-scheme entry gets its own
            // connection, even for an identical target URI.
            None => registry.construct(impl_id, target, config).await?,
        };

        Ok(MountConnection {
            backend,
            owned: true,
        })
    }

    /// The URI scheme this router is bound to.
    pub fn overloaded_scheme(&self) -> &str {
        &self.scheme
    }

    /// Whether the router-local inner cache is enabled.
    pub fn inner_cache_enabled(&self) -> bool {
        self.inner_cache.is_some()
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn mount_table(&self) -> &MountTable {
        &self.table
    }

    /// Configured mount prefixes, fallback excluded.
    pub fn mount_points(&self) -> Vec<String> {
        self.table
            .entries()
            .iter()
            .map(|e| e.prefix.clone())
            .collect()
    }

    /// Distinct live backend connections behind this router.
    pub fn child_connections(&self) -> Vec<Arc<dyn Backend>> {
        let mut out: Vec<Arc<dyn Backend>> = Vec::new();
        for connection in &self.connections {
            if !out.iter().any(|b| Arc::ptr_eq(b, &connection.backend)) {
                out.push(connection.backend.clone());
            }
        }
        out
    }

    /// Close every connection this router owns, exactly once.
    ///
    /// Connections obtained through the ambient cache are left open for
    /// their ambient owner.
    pub async fn close(&self) -> Result<()> {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return Ok(());
            }
            *closed = true;
        }
        debug!("Closing router {}://{}", self.scheme, self.authority);

        let mut seen: Vec<Arc<dyn Backend>> = Vec::new();
        for connection in &self.connections {
            if !connection.owned {
                continue;
            }
            if seen.iter().any(|b| Arc::ptr_eq(b, &connection.backend)) {
                continue;
            }
            connection.backend.close().await?;
            seen.push(connection.backend.clone());
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Filesystem operations
    // -------------------------------------------------------------------

    pub async fn create(&self, path: &str) -> Result<()> {
        match self.table.resolve(path)? {
            Resolved::Root => Err(root::root_mutation_error(&self.table, "create")),
            Resolved::Link { index, remapped } => {
                debug!("create {path} -> {remapped}");
                self.connections[index].backend.create(&remapped).await
            }
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        match self.table.resolve(path)? {
            Resolved::Root => Err(root::root_mutation_error(&self.table, "mkdir")),
            Resolved::Link { index, remapped } => {
                debug!("mkdir {path} -> {remapped}");
                self.connections[index].backend.mkdir(&remapped).await
            }
        }
    }

    pub async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        match self.table.resolve(path)? {
            Resolved::Root => Err(root::root_mutation_error(&self.table, "delete")),
            Resolved::Link { index, remapped } => {
                debug!("delete {path} -> {remapped} recursive={recursive}");
                self.connections[index]
                    .backend
                    .delete(&remapped, recursive)
                    .await
            }
        }
    }

    /// Rename within one mount entry. Both endpoints must resolve to the
    /// same link; the router never moves data between backends.
    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.table.resolve(src)?;
        let to = self.table.resolve(dst)?;
        match (from, to) {
            (Resolved::Root, _) | (_, Resolved::Root) => {
                Err(root::root_mutation_error(&self.table, "rename"))
            }
            (
                Resolved::Link {
                    index: from_index,
                    remapped: from_path,
                },
                Resolved::Link {
                    index: to_index,
                    remapped: to_path,
                },
            ) => {
                if from_index != to_index {
                    return Err(RouterError::NotSupported(format!(
                        "rename across mount points: {src} -> {dst}"
                    )));
                }
                debug!("rename {src} -> {dst} ({from_path} -> {to_path})");
                self.connections[from_index]
                    .backend
                    .rename(&from_path, &to_path)
                    .await
            }
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.table.resolve(path)? {
            Resolved::Root => Ok(true),
            Resolved::Link { index, remapped } => {
                self.connections[index].backend.exists(&remapped).await
            }
        }
    }

    pub async fn get_file_status(&self, path: &str) -> Result<FileStatus> {
        match self.table.resolve(path)? {
            Resolved::Root => Ok(root::root_status()),
            Resolved::Link { index, remapped } => {
                self.connections[index].backend.stat(&remapped).await
            }
        }
    }

    pub fn list_status(&self, path: &str) -> FileStatusStream {
        match self.table.resolve(path) {
            Err(e) => Box::pin(stream::once(async move { Err::<FileStatus, _>(e) })),
            Ok(Resolved::Root) => {
                debug!("list / from mount table");
                Box::pin(stream::iter(
                    root::list_root(&self.table)
                        .into_iter()
                        .map(Ok::<_, RouterError>),
                ))
            }
            Ok(Resolved::Link { index, remapped }) => {
                debug!("list {path} -> {remapped}");
                self.connections[index].backend.list_status(&remapped)
            }
        }
    }

    pub async fn open(&self, path: &str) -> Result<ByteStream> {
        match self.table.resolve(path)? {
            Resolved::Root => Err(RouterError::IsADirectory("/".to_string())),
            Resolved::Link { index, remapped } => {
                debug!("open {path} -> {remapped}");
                self.connections[index].backend.open(&remapped).await
            }
        }
    }
}

/// A router is itself a backend, so it can stand anywhere one can.
#[async_trait]
impl Backend for Router {
    async fn stat(&self, path: &str) -> Result<FileStatus> {
        self.get_file_status(path).await
    }

    async fn create(&self, path: &str) -> Result<()> {
        Router::create(self, path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        Router::mkdir(self, path).await
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        Router::delete(self, path, recursive).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        Router::rename(self, from, to).await
    }

    fn list_status(&self, path: &str) -> FileStatusStream {
        Router::list_status(self, path)
    }

    async fn open(&self, path: &str) -> Result<ByteStream> {
        Router::open(self, path).await
    }

    async fn close(&self) -> Result<()> {
        Router::close(self).await
    }
}
