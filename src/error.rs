use std::io;
use thiserror::Error;

/// Main error type for vfs-router operations
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No implementation registered for scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Failed to connect backend: {0}")]
    Connection(String),

    #[error("Path not in any mount point: {0}")]
    NotInMountpoint(String),

    #[error("Permission denied: {0}")]
    AccessControl(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RouterError {
    /// Whether this error is fatal to router construction.
    ///
    /// Per-operation errors never invalidate a built router; these three
    /// only ever surface while the mount table is being brought up.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            RouterError::Config(_)
                | RouterError::UnsupportedScheme(_)
                | RouterError::Connection(_)
        )
    }
}

/// Result type alias for vfs-router operations
pub type Result<T> = std::result::Result<T, RouterError>;
