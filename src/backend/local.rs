//! Local-disk backend
//!
//! Serves `file://` targets straight from the local filesystem via
//! `tokio::fs`. Remapped paths are absolute OS paths, so one connection per
//! (scheme, authority) covers every `file://` mount target in a process.

use std::path::Path;
use std::time::SystemTime;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::backend::{Backend, ByteStream, FileStatus, FileStatusStream};
use crate::config::Configuration;
use crate::error::{Result, RouterError};
use crate::paths;
use crate::uri::TargetUri;

/// Read chunk size for open()
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem backend connection
///
/// One connection serves every `file://` target in a process; each mount
/// entry's own target path is checked through `verify_target`.
pub struct LocalBackend;

impl LocalBackend {
    /// Connect to a local target, verifying it is an existing directory.
    pub async fn connect(uri: &TargetUri, _config: &Configuration) -> Result<Self> {
        let backend = Self;
        backend.verify_target(&uri.path).await?;
        debug!("Connected local backend for {uri}");
        Ok(backend)
    }

    fn status_from(path: &str, meta: &std::fs::Metadata) -> FileStatus {
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if meta.is_dir() {
            FileStatus::directory(path, mtime)
        } else {
            FileStatus::file(path, meta.len(), mtime)
        }
    }
}

fn map_io(path: &str, e: std::io::Error) -> RouterError {
    match e.kind() {
        std::io::ErrorKind::NotFound => RouterError::NotFound(path.to_string()),
        std::io::ErrorKind::AlreadyExists => RouterError::AlreadyExists(path.to_string()),
        std::io::ErrorKind::PermissionDenied => RouterError::AccessControl(path.to_string()),
        _ => RouterError::Io(e),
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn verify_target(&self, path: &str) -> Result<()> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            RouterError::Connection(format!("local target {path} is unreachable: {e}"))
        })?;
        if !meta.is_dir() {
            return Err(RouterError::Connection(format!(
                "local target {path} is not a directory"
            )));
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileStatus> {
        let path = paths::normalize(path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        Ok(Self::status_from(&path, &meta))
    }

    async fn create(&self, path: &str) -> Result<()> {
        let path = paths::normalize(path)?;
        debug!("local: create {path}");
        if let Some(parent) = Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(&path, e))?;
        }
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = paths::normalize(path)?;
        debug!("local: mkdir {path}");
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| map_io(&path, e))
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = paths::normalize(path)?;
        debug!("local: delete {path} recursive={recursive}");
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        if !meta.is_dir() {
            return tokio::fs::remove_file(&path)
                .await
                .map_err(|e| map_io(&path, e));
        }
        if recursive {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| map_io(&path, e))
        } else {
            let mut entries = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| map_io(&path, e))?;
            if entries.next_entry().await.map_err(|e| map_io(&path, e))?.is_some() {
                return Err(RouterError::NotEmpty(path));
            }
            tokio::fs::remove_dir(&path)
                .await
                .map_err(|e| map_io(&path, e))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = paths::normalize(from)?;
        let to = paths::normalize(to)?;
        debug!("local: rename {from} -> {to}");
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| map_io(&from, e))
    }

    fn list_status(&self, path: &str) -> FileStatusStream {
        let path = path.to_string();
        Box::pin(try_stream! {
            let path = paths::normalize(&path)?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| map_io(&path, e))?;
            if !meta.is_dir() {
                yield LocalBackend::status_from(&path, &meta);
            } else {
                let mut entries = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| map_io(&path, e))?;
                while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(&path, e))? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let child = paths::join(&path, &format!("/{name}"));
                    let meta = entry.metadata().await.map_err(|e| map_io(&child, e))?;
                    yield LocalBackend::status_from(&child, &meta);
                }
            }
        })
    }

    async fn open(&self, path: &str) -> Result<ByteStream> {
        let path = paths::normalize(path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        if meta.is_dir() {
            return Err(RouterError::IsADirectory(path));
        }
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io(&path, e))?;
        Ok(Box::pin(try_stream! {
            loop {
                let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
                let n = file.read_buf(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield buf.freeze();
            }
        }))
    }
}
