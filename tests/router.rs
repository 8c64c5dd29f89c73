//! Integration tests for the router facade: mount resolution, root
//! virtualization, the two cache tiers, and fail-fast construction.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;

use vfs_router::backend::memory::MemBackend;
use vfs_router::backend::registry::{AmbientCache, BackendFuture, BackendRegistry};
use vfs_router::backend::{Backend, ByteStream, FileStatus, FileStatusStream};
use vfs_router::config::Configuration;
use vfs_router::router::Router;
use vfs_router::uri::TargetUri;
use vfs_router::{Result, RouterError};

const ROUTER_URI: &str = "mem://cluster1";
const AUTHORITY: &str = "cluster1";

fn base_config() -> Configuration {
    let mut config = Configuration::new();
    config.set_target_impl("mem", "mem");
    config
}

async fn build(config: Configuration, ambient: &AmbientCache) -> Result<Router> {
    Router::with_registry(ROUTER_URI, config, &BackendRegistry::default(), ambient).await
}

async fn mem_backend(store: &str) -> MemBackend {
    let uri = TargetUri::parse(&format!("mem://{store}")).unwrap();
    MemBackend::connect(&uri, &Configuration::new())
        .await
        .unwrap()
}

async fn list_names(router: &Router, path: &str) -> Result<BTreeSet<String>> {
    Ok(router
        .list_status(path)
        .try_collect::<Vec<_>>()
        .await?
        .iter()
        .map(|s| s.name().to_string())
        .collect())
}

// ---------------------------------------------------------------------------
// Routing and visibility
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_routes_to_the_matching_backend_only() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-a/x");
    config.add_link(AUTHORITY, "/B", "mem://scen-b/y");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    router.create("/A/f").await.unwrap();

    let backend1 = mem_backend("scen-a").await;
    let backend2 = mem_backend("scen-b").await;
    assert!(backend1.exists("/x/f").await.unwrap());
    assert!(!backend2.exists("/y/f").await.unwrap());

    assert_eq!(
        list_names(&router, "/").await.unwrap(),
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );

    let err = router
        .list_status("/C")
        .try_collect::<Vec<_>>()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RouterError::NotInMountpoint(_)));

    router.close().await.unwrap();
}

#[tokio::test]
async fn test_fallback_catches_unmounted_paths() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-fb/x");
    config.add_link(AUTHORITY, "/B", "mem://scen-fb/y");
    config.add_link_fallback(AUTHORITY, "mem://scen-fb/x");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    router.create("/C/f").await.unwrap();

    // The fallback keeps the full logical path under its target.
    let backend = mem_backend("scen-fb").await;
    assert!(backend.exists("/x/C/f").await.unwrap());

    assert_eq!(
        list_names(&router, "/C").await.unwrap(),
        BTreeSet::from(["f".to_string()])
    );

    router.close().await.unwrap();
}

#[tokio::test]
async fn test_longest_prefix_wins_end_to_end() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/a", "mem://scen-lp/short");
    config.add_link(AUTHORITY, "/a/b", "mem://scen-lp/long");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    router.create("/a/b/f").await.unwrap();
    router.create("/a/g").await.unwrap();

    let backend = mem_backend("scen-lp").await;
    assert!(backend.exists("/long/f").await.unwrap());
    assert!(!backend.exists("/short/b/f").await.unwrap());
    assert!(backend.exists("/short/g").await.unwrap());
}

#[tokio::test]
async fn test_mixed_memory_and_local_targets() {
    let local_dir = tempfile::tempdir().unwrap();
    let mut config = base_config();
    config.add_link(AUTHORITY, "/data", "mem://scen-mixed/store");
    config.add_link(
        AUTHORITY,
        "/local",
        &format!("file://{}", local_dir.path().display()),
    );
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    router.create("/data/testfile").await.unwrap();
    router.mkdir("/local/test").await.unwrap();

    // Each side lands in its own backend and nowhere else.
    let backend = mem_backend("scen-mixed").await;
    assert!(backend.exists("/store/testfile").await.unwrap());
    assert!(!backend.exists("/store/test").await.unwrap());
    assert!(local_dir.path().join("test").is_dir());
    assert!(!local_dir.path().join("testfile").exists());

    router.close().await.unwrap();
}

#[tokio::test]
async fn test_open_reads_through_the_router() {
    let local_dir = tempfile::tempdir().unwrap();
    std::fs::write(local_dir.path().join("greeting"), b"hello").unwrap();

    let mut config = base_config();
    config.add_link(
        AUTHORITY,
        "/files",
        &format!("file://{}", local_dir.path().display()),
    );
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    let chunks: Vec<bytes::Bytes> = router
        .open("/files/greeting")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), b"hello");

    let status = router.get_file_status("/files/greeting").await.unwrap();
    assert!(status.is_file());
    assert_eq!(status.size, 5);
}

#[tokio::test]
async fn test_rename_within_and_across_mounts() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-rename/x");
    config.add_link(AUTHORITY, "/B", "mem://scen-rename/y");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    router.create("/A/old").await.unwrap();
    router.rename("/A/old", "/A/new").await.unwrap();
    assert!(router.exists("/A/new").await.unwrap());
    assert!(!router.exists("/A/old").await.unwrap());

    let err = router.rename("/A/new", "/B/new").await.err().unwrap();
    assert!(matches!(err, RouterError::NotSupported(_)));
}

// ---------------------------------------------------------------------------
// Root virtualization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_root_mutations_fail_without_fallback() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-root/x");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    for err in [
        router.create("/").await.err().unwrap(),
        router.mkdir("/").await.err().unwrap(),
        router.delete("/", true).await.err().unwrap(),
        router.rename("/", "/A/z").await.err().unwrap(),
        router.rename("/A/z", "/").await.err().unwrap(),
    ] {
        assert!(matches!(err, RouterError::NotInMountpoint(_)), "{err}");
    }
}

#[tokio::test]
async fn test_root_stays_read_only_even_with_fallback() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-rootfb/x");
    config.add_link_fallback(AUTHORITY, "mem://scen-rootfb/x");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    for err in [
        router.create("/").await.err().unwrap(),
        router.mkdir("/").await.err().unwrap(),
        router.delete("/", true).await.err().unwrap(),
    ] {
        assert!(matches!(err, RouterError::AccessControl(_)), "{err}");
    }
}

#[tokio::test]
async fn test_root_listing_is_synthesized_from_the_table() {
    for with_fallback in [false, true] {
        let mut config = base_config();
        config.add_link(AUTHORITY, "/A", "mem://scen-rootls/x");
        config.add_link(AUTHORITY, "/A/deep", "mem://scen-rootls/y");
        config.add_link(AUTHORITY, "/B", "mem://scen-rootls/z");
        if with_fallback {
            config.add_link_fallback(AUTHORITY, "mem://scen-rootls/fb");
        }
        let ambient = AmbientCache::new();
        let router = build(config, &ambient).await.unwrap();

        // One entry per distinct top-level segment; the fallback never shows.
        let listing: Vec<FileStatus> = router.list_status("/").try_collect().await.unwrap();
        assert!(listing.iter().all(|s| s.is_dir()));
        let names: BTreeSet<String> = listing.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, BTreeSet::from(["A".to_string(), "B".to_string()]));
    }
}

#[tokio::test]
async fn test_root_reads_are_synthetic() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-rootread/x");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    assert!(router.exists("/").await.unwrap());
    let status = router.get_file_status("/").await.unwrap();
    assert!(status.is_dir());
    assert_eq!(status.path, "/");
    assert!(matches!(
        router.open("/").await.err().unwrap(),
        RouterError::IsADirectory(_)
    ));
}

// ---------------------------------------------------------------------------
// Caching tiers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_inner_cache_shares_identical_overloaded_targets() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/user0", "mem://scen-cache-on/data");
    config.add_link(AUTHORITY, "/user1", "mem://scen-cache-on/data");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    assert!(router.inner_cache_enabled());
    assert_eq!(router.child_connections().len(), 1);
}

#[tokio::test]
async fn test_disabled_inner_cache_isolates_overloaded_targets() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/user0", "mem://scen-cache-off/data");
    config.add_link(AUTHORITY, "/user1", "mem://scen-cache-off/data");
    config.set_enable_inner_cache(false);
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    assert!(!router.inner_cache_enabled());
    assert_eq!(router.child_connections().len(), 2);

    // Isolation is about connections, not data: both still reach the store.
    router.create("/user0/f").await.unwrap();
    assert!(router.exists("/user1/f").await.unwrap());
}

#[tokio::test]
async fn test_ambient_cache_still_dedupes_cross_scheme_targets() {
    let local_dir = tempfile::tempdir().unwrap();
    let target = format!("file://{}", local_dir.path().display());

    let mut config = base_config();
    config.add_link(AUTHORITY, "/local0", &target);
    config.add_link(AUTHORITY, "/local1", &target);
    // The toggle governs same-scheme connections only.
    config.set_enable_inner_cache(false);
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    assert_eq!(router.child_connections().len(), 1);
}

#[tokio::test]
async fn test_ambient_cache_constructs_once_under_concurrent_misses() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let counter = constructions.clone();

    // Factory that stalls long enough for both misses to overlap.
    let mut registry = BackendRegistry::new();
    registry.register(
        "slow",
        Arc::new(
            move |_uri: TargetUri, _config: Configuration| -> BackendFuture {
                let counter = counter.clone();
                Box::pin(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(ClosableBackend {
                        closes: Arc::new(AtomicUsize::new(0)),
                    }) as Arc<dyn Backend>)
                })
            },
        ),
    );

    let ambient = AmbientCache::new();
    let uri = TargetUri::parse("slow://host/x").unwrap();
    let config = Configuration::new();

    let (a, b) = tokio::join!(
        ambient.get_or_connect(&registry, &uri, &config),
        ambient.get_or_connect(&registry, &uri, &config),
    );
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_targets_never_share_a_connection() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/a", "mem://scen-distinct/x");
    config.add_link(AUTHORITY, "/b", "mem://scen-distinct/y");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    // Same store, different target paths: distinct BackendKeys.
    assert_eq!(router.child_connections().len(), 2);
}

// ---------------------------------------------------------------------------
// Fail-fast construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unregistered_scheme_aborts_construction() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/ok", "mem://scen-bad/x");
    config.add_link(AUTHORITY, "/bad", "nonexistent://somewhere/x");
    let ambient = AmbientCache::new();

    let err = build(config, &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::UnsupportedScheme(_)));
    assert!(err.is_construction_error());
}

#[tokio::test]
async fn test_missing_overloaded_target_impl_aborts_construction() {
    // No overloaded-scheme.target-impl.mem mapping at all.
    let mut config = Configuration::new();
    config.add_link(AUTHORITY, "/A", "mem://scen-noimpl/x");
    let ambient = AmbientCache::new();

    let err = build(config, &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::UnsupportedScheme(_)));
}

#[tokio::test]
async fn test_unreachable_target_aborts_construction() {
    let mut config = base_config();
    // A memory target without a store authority cannot be connected.
    config.add_link(AUTHORITY, "/A", "mem:///x");
    let ambient = AmbientCache::new();

    let err = build(config, &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::Connection(_)));
}

#[tokio::test]
async fn test_unreachable_local_target_aborts_construction() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "file:///definitely/not/here");
    let ambient = AmbientCache::new();

    let err = build(config, &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::Connection(_)));
}

#[tokio::test]
async fn test_every_local_target_is_validated_at_construction() {
    let good_dir = tempfile::tempdir().unwrap();
    let mut config = base_config();
    // The reachable entry sorts first and seeds the ambient cache with the
    // one file:// connection; the unreachable entry rides that cached
    // connection and must still abort construction.
    config.add_link(
        AUTHORITY,
        "/a",
        &format!("file://{}", good_dir.path().display()),
    );
    config.add_link(AUTHORITY, "/b", "file:///definitely/not/here");
    let ambient = AmbientCache::new();

    let err = build(config, &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::Connection(_)), "{err}");
    assert!(err.is_construction_error());
}

#[tokio::test]
async fn test_empty_mount_table_aborts_construction() {
    let ambient = AmbientCache::new();
    let err = build(base_config(), &ambient).await.err().unwrap();
    assert!(matches!(err, RouterError::Config(_)));
}

#[tokio::test]
async fn test_construction_failure_happens_before_any_operation() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/bad", "nonexistent://somewhere/x");
    let ambient = AmbientCache::new();

    // The error surfaces from construction itself; there is no router to
    // operate on afterwards.
    assert!(build(config, &ambient).await.is_err());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Backend that only counts close() calls; every file operation is refused.
struct ClosableBackend {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Backend for ClosableBackend {
    async fn stat(&self, path: &str) -> Result<FileStatus> {
        Err(RouterError::NotFound(path.to_string()))
    }

    async fn create(&self, path: &str) -> Result<()> {
        Err(RouterError::NotSupported(path.to_string()))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        Err(RouterError::NotSupported(path.to_string()))
    }

    async fn delete(&self, path: &str, _recursive: bool) -> Result<()> {
        Err(RouterError::NotSupported(path.to_string()))
    }

    async fn rename(&self, from: &str, _to: &str) -> Result<()> {
        Err(RouterError::NotSupported(from.to_string()))
    }

    fn list_status(&self, _path: &str) -> FileStatusStream {
        Box::pin(futures::stream::empty::<Result<FileStatus>>())
    }

    async fn open(&self, path: &str) -> Result<ByteStream> {
        Err(RouterError::NotSupported(path.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn registry_with_closable(closes: Arc<AtomicUsize>) -> BackendRegistry {
    let mut registry = BackendRegistry::default();
    registry.register(
        "closable",
        Arc::new(
            move |_uri: TargetUri, _config: Configuration| -> BackendFuture {
                let closes = closes.clone();
                Box::pin(
                    async move { Ok(Arc::new(ClosableBackend { closes }) as Arc<dyn Backend>) },
                )
            },
        ),
    );
    registry
}

#[tokio::test]
async fn test_close_closes_owned_connections_exactly_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_closable(closes.clone());
    let ambient = AmbientCache::new();

    // Overloaded scheme "closable": both entries share one owned connection.
    let mut config = Configuration::new();
    config.set_target_impl("closable", "closable");
    config.add_link(AUTHORITY, "/a", "closable://t/data");
    config.add_link(AUTHORITY, "/b", "closable://t/data");

    let router = Router::with_registry("closable://cluster1", config, &registry, &ambient)
        .await
        .unwrap();
    assert_eq!(router.child_connections().len(), 1);

    router.close().await.unwrap();
    router.close().await.unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_leaves_ambient_connections_open() {
    let closes = Arc::new(AtomicUsize::new(0));
    let registry = registry_with_closable(closes.clone());
    let ambient = AmbientCache::new();

    // Router overloads "mem"; "closable" targets go through the ambient tier.
    let mut config = base_config();
    config.add_link(AUTHORITY, "/a", "closable://t/data");
    config.add_link(AUTHORITY, "/keep", "mem://scen-close/x");

    let router = Router::with_registry(ROUTER_URI, config, &registry, &ambient)
        .await
        .unwrap();
    router.close().await.unwrap();

    // The ambient owner manages that connection, not the router.
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mount_points_reports_configured_prefixes() {
    let mut config = base_config();
    config.add_link(AUTHORITY, "/A", "mem://scen-intro/x");
    config.add_link(AUTHORITY, "/B/deep", "mem://scen-intro/y");
    config.add_link_fallback(AUTHORITY, "mem://scen-intro/fb");
    let ambient = AmbientCache::new();
    let router = build(config, &ambient).await.unwrap();

    let mut points = router.mount_points();
    points.sort();
    assert_eq!(points, vec!["/A".to_string(), "/B/deep".to_string()]);
    assert_eq!(router.overloaded_scheme(), "mem");
    assert_eq!(router.authority(), AUTHORITY);
}
