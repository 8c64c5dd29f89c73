pub mod local;
pub mod memory;
pub mod registry;

use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::{Result, RouterError};
use crate::paths;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// Metadata for a file or directory
#[derive(Debug, Clone)]
pub struct FileStatus {
    /// Logical path of the entry within the filesystem it came from.
    pub path: String,
    pub file_type: FileType,
    pub size: u64,
    pub mtime: SystemTime,
}

impl FileStatus {
    pub fn file(path: impl Into<String>, size: u64, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::File,
            size,
            mtime,
        }
    }

    pub fn directory(path: impl Into<String>, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::Directory,
            size: 0,
            mtime,
        }
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        paths::file_name(&self.path)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }
}

/// Stream type for directory listings
pub type FileStatusStream = Pin<Box<dyn Stream<Item = Result<FileStatus>> + Send>>;

/// Stream type for file content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Core trait for backend filesystem connections
///
/// Backends are stateless and path-based: each operation receives an
/// absolute, already-remapped path. Connections are validated when they are
/// constructed (see `registry`), never lazily on first use.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get metadata for a path
    async fn stat(&self, path: &str) -> Result<FileStatus>;

    /// Check if a path exists
    ///
    /// Default implementation uses stat()
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(RouterError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Verify that a mount target path is reachable through this connection
    ///
    /// Runs once per mount entry while a router is built, including for
    /// entries served by an already-cached connection, so a shared connection
    /// never hides an unreachable target.
    ///
    /// Default implementation accepts any path
    async fn verify_target(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// Create an empty file, failing if it already exists
    async fn create(&self, path: &str) -> Result<()>;

    /// Create a directory and any missing ancestors
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove a file or directory
    ///
    /// # Arguments
    /// * `path` - Path to remove
    /// * `recursive` - If false, a directory must be empty
    async fn delete(&self, path: &str, recursive: bool) -> Result<()>;

    /// Rename/move a file or directory
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List directory contents as a stream
    ///
    /// Listing a file yields that file's own status.
    fn list_status(&self, path: &str) -> FileStatusStream;

    /// Open a file for reading
    async fn open(&self, path: &str) -> Result<ByteStream>;

    /// Release any resources held by this connection
    ///
    /// Default implementation is a no-op
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
