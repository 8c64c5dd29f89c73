//! vfs-router: a virtual filesystem router with pluggable backend architecture
//!
//! This library presents a single logical filesystem namespace backed by a
//! mount table that maps path prefixes to independently addressed backend
//! filesystems (each identified by a URI with its own scheme and authority).
//!
//! # Architecture
//!
//! - **Backends**: Storage targets (in-memory, local disk, etc.) that implement
//!   the `Backend` trait for path-based file operations.
//! - **Mount Table**: Immutable prefix -> target-URI bindings plus an optional
//!   fallback link, built once from configuration.
//! - **Backend Registry**: Instantiates and validates backend connections at
//!   router construction, applying a two-tier caching policy (router-local
//!   inner cache for overloaded-scheme targets, process-wide ambient cache
//!   for everything else).
//! - **Router**: Resolves logical paths longest-prefix-first, virtualizes the
//!   namespace root as a synthetic read-only directory, and delegates every
//!   operation to the matched backend.
//!
//! # Example
//!
//! ```no_run
//! use vfs_router::config::Configuration;
//! use vfs_router::router::Router;
//!
//! # async fn example() -> vfs_router::Result<()> {
//! let mut config = Configuration::new();
//! config.add_link("cluster", "/data", "mem://pool/data");
//! config.set_target_impl("mem", "mem");
//!
//! // Construction eagerly connects and validates every mount target.
//! let router = Router::new("mem://cluster", config).await?;
//! router.mkdir("/data/reports").await?;
//! router.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod mount;
pub mod paths;
pub mod root;
pub mod router;
pub mod uri;

pub use error::{Result, RouterError};
