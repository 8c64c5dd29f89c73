//! In-memory backend
//!
//! Stores are named by URI authority and shared process-wide, so two
//! connections to the same authority observe the same tree. Directories may
//! be explicit (created with mkdir) or implied by deeper entries, the way
//! object stores imply directories from key prefixes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::backend::{Backend, ByteStream, FileStatus, FileStatusStream, FileType};
use crate::config::Configuration;
use crate::error::{Result, RouterError};
use crate::paths;
use crate::uri::TargetUri;

/// Process-wide named stores, keyed by authority.
static STORES: Lazy<DashMap<String, Arc<MemStore>>> = Lazy::new(DashMap::new);

#[derive(Debug, Clone)]
struct MemNode {
    file_type: FileType,
    data: Bytes,
    mtime: SystemTime,
}

impl MemNode {
    fn status(&self, path: &str) -> FileStatus {
        FileStatus {
            path: path.to_string(),
            file_type: self.file_type,
            size: self.data.len() as u64,
            mtime: self.mtime,
        }
    }
}

/// Node map for one named store
#[derive(Debug, Default)]
struct MemStore {
    nodes: DashMap<String, MemNode>,
}

impl MemStore {
    /// Status of a path, honoring implicit directories.
    fn status(&self, path: &str) -> Option<FileStatus> {
        if path == "/" {
            return Some(FileStatus::directory("/", SystemTime::UNIX_EPOCH));
        }
        if let Some(node) = self.nodes.get(path) {
            return Some(node.value().status(path));
        }
        let prefix = format!("{path}/");
        if self.nodes.iter().any(|e| e.key().starts_with(&prefix)) {
            return Some(FileStatus::directory(path, SystemTime::UNIX_EPOCH));
        }
        None
    }

    /// Direct children of a directory path, implicit entries included.
    fn children(&self, path: &str) -> Vec<FileStatus> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };

        let mut out: BTreeMap<String, FileStatus> = BTreeMap::new();
        for entry in self.nodes.iter() {
            let Some(rest) = entry.key().strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let (segment, deeper) = match rest.split_once('/') {
                Some((seg, _)) => (seg, true),
                None => (rest, false),
            };
            let child = format!("{prefix}{segment}");
            if deeper {
                // Implied directory unless an explicit node already claimed it.
                out.entry(child.clone())
                    .or_insert_with(|| FileStatus::directory(child, SystemTime::UNIX_EPOCH));
            } else {
                out.insert(child.clone(), entry.value().status(&child));
            }
        }
        out.into_values().collect()
    }

    fn is_file(&self, path: &str) -> bool {
        self.nodes
            .get(path)
            .map(|n| n.value().file_type == FileType::File)
            .unwrap_or(false)
    }
}

/// In-memory backend connection
pub struct MemBackend {
    authority: String,
    store: Arc<MemStore>,
}

impl MemBackend {
    /// Connect to a named store, creating it on first use.
    ///
    /// An authority is the store name; a target without one is unreachable.
    pub async fn connect(uri: &TargetUri, _config: &Configuration) -> Result<Self> {
        let authority = uri.authority.clone().ok_or_else(|| {
            RouterError::Connection(format!("memory target has no store authority: {uri}"))
        })?;

        let store = STORES
            .entry(authority.clone())
            .or_insert_with(|| Arc::new(MemStore::default()))
            .clone();

        debug!("Connected memory backend to store {authority}");
        Ok(Self { authority, store })
    }

    /// Reject writes whose ancestor is an existing file.
    fn check_parents(&self, path: &str) -> Result<()> {
        let mut ancestor = path;
        while let Some(idx) = ancestor.rfind('/') {
            if idx == 0 {
                break;
            }
            ancestor = &ancestor[..idx];
            if self.store.is_file(ancestor) {
                return Err(RouterError::NotADirectory(ancestor.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemBackend {
    async fn stat(&self, path: &str) -> Result<FileStatus> {
        let path = paths::normalize(path)?;
        self.store
            .status(&path)
            .ok_or(RouterError::NotFound(path))
    }

    async fn create(&self, path: &str) -> Result<()> {
        let path = paths::normalize(path)?;
        if self.store.status(&path).is_some() {
            return Err(RouterError::AlreadyExists(path));
        }
        self.check_parents(&path)?;
        debug!("mem[{}]: create {path}", self.authority);
        self.store.nodes.insert(
            path,
            MemNode {
                file_type: FileType::File,
                data: Bytes::new(),
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = paths::normalize(path)?;
        match self.store.status(&path) {
            Some(s) if s.is_dir() => return Ok(()),
            Some(_) => return Err(RouterError::AlreadyExists(path)),
            None => {}
        }
        self.check_parents(&path)?;
        debug!("mem[{}]: mkdir {path}", self.authority);

        // Materialize the directory and any missing ancestors.
        let mut dir = path.as_str();
        loop {
            if dir == "/" || self.store.nodes.contains_key(dir) {
                break;
            }
            self.store.nodes.insert(
                dir.to_string(),
                MemNode {
                    file_type: FileType::Directory,
                    data: Bytes::new(),
                    mtime: SystemTime::now(),
                },
            );
            match dir.rfind('/') {
                Some(0) | None => break,
                Some(idx) => dir = &path[..idx],
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = paths::normalize(path)?;
        if path == "/" {
            return Err(RouterError::InvalidPath(
                "cannot delete the store root".to_string(),
            ));
        }
        if self.store.status(&path).is_none() {
            return Err(RouterError::NotFound(path));
        }
        let children = self.store.children(&path);
        if !children.is_empty() && !recursive {
            return Err(RouterError::NotEmpty(path));
        }
        debug!("mem[{}]: delete {path} recursive={recursive}", self.authority);

        let prefix = format!("{path}/");
        self.store
            .nodes
            .retain(|k, _| k != &path && !k.starts_with(&prefix));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = paths::normalize(from)?;
        let to = paths::normalize(to)?;
        if self.store.status(&from).is_none() {
            return Err(RouterError::NotFound(from));
        }
        if self.store.status(&to).is_some() {
            return Err(RouterError::AlreadyExists(to));
        }
        self.check_parents(&to)?;
        debug!("mem[{}]: rename {from} -> {to}", self.authority);

        let prefix = format!("{from}/");
        let keys: Vec<String> = self
            .store
            .nodes
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k == &from || k.starts_with(&prefix))
            .collect();
        for key in keys {
            if let Some((_, node)) = self.store.nodes.remove(&key) {
                let moved = format!("{to}{}", &key[from.len()..]);
                self.store.nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    fn list_status(&self, path: &str) -> FileStatusStream {
        let store = self.store.clone();
        let path = path.to_string();
        Box::pin(try_stream! {
            let path = paths::normalize(&path)?;
            let status = store
                .status(&path)
                .ok_or_else(|| RouterError::NotFound(path.clone()))?;
            if status.is_file() {
                yield status;
            } else {
                for child in store.children(&path) {
                    yield child;
                }
            }
        })
    }

    async fn open(&self, path: &str) -> Result<ByteStream> {
        let path = paths::normalize(path)?;
        let node = self
            .store
            .nodes
            .get(&path)
            .map(|n| n.value().clone())
            .ok_or_else(|| RouterError::NotFound(path.clone()))?;
        if node.file_type == FileType::Directory {
            return Err(RouterError::IsADirectory(path));
        }
        Ok(Box::pin(futures::stream::once(async move {
            Ok::<_, RouterError>(node.data)
        })))
    }
}
