//! Root virtualization
//!
//! The namespace root is a synthetic, read-only directory owned by the
//! router itself. Its listing is derived from the mount table, never fetched
//! from a backend, and no mutation ever reaches a backend through it.

use std::time::SystemTime;

use crate::backend::FileStatus;
use crate::error::RouterError;
use crate::mount::MountTable;

/// Synthetic status for the root directory.
pub fn root_status() -> FileStatus {
    FileStatus::directory("/", SystemTime::UNIX_EPOCH)
}

/// Synthesize the root listing: one directory entry per distinct top-level
/// mount prefix segment. The fallback link is not listed.
pub fn list_root(table: &MountTable) -> Vec<FileStatus> {
    table
        .top_level_names()
        .into_iter()
        .map(|name| FileStatus::directory(format!("/{name}"), SystemTime::UNIX_EPOCH))
        .collect()
}

/// Error for a mutation addressed directly at the root.
///
/// With no fallback the root resolves to nothing, so the failure is a
/// resolution failure. With a fallback the root is resolvable but stays
/// permanently read-only, so the write is rejected on authorization grounds.
pub fn root_mutation_error(table: &MountTable, operation: &str) -> RouterError {
    if table.fallback().is_some() {
        RouterError::AccessControl(format!(
            "Mount table root is read only: cannot {operation} /"
        ))
    } else {
        RouterError::NotInMountpoint("/".to_string())
    }
}
