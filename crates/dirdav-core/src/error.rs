//! Error types for resource operations.
//!
//! Every fallible resource operation returns [`ResourceError`]. Callers that
//! only care about the broad outcome (to pick a status code, say) match on
//! [`ResourceError::kind`] instead of individual variants.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by the resource layer.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The path does not name an existing resource.
    #[error("Resource not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A resource already exists where a new one was to be created.
    #[error("Resource already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The operation conflicts with the current state of the tree.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials were missing or rejected.
    #[error("Not authenticated")]
    Unauthorized,

    /// The operation is not permitted on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request path resolves outside the served root.
    #[error("Path escapes the served root: {0}")]
    OutsideRoot(String),

    /// A child name that is not a single path segment.
    #[error("Invalid resource name: {0:?}")]
    InvalidName(String),

    /// The resource is exclusively locked under another token.
    #[error("Resource is locked: {}", path.display())]
    Locked {
        /// Identity of the locked resource.
        path: PathBuf,
        /// Token of the lock currently held.
        token: String,
    },

    /// A lock token did not match an active lock.
    #[error("Lock precondition failed: {0}")]
    PreconditionFailed(String),

    /// The configured root is missing or not a directory.
    #[error("Root directory does not exist or is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// Unexpected filesystem failure.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path the failing operation was acting on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Broad classification of a [`ResourceError`].
///
/// This is what a protocol layer maps to wire status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing exists at the path (404).
    NotFound,
    /// Existing state prevents the operation (405/409).
    Conflict,
    /// Authentication required or failed (401).
    Unauthorized,
    /// Not permitted (403).
    Forbidden,
    /// Locked by another token (423).
    Locked,
    /// Lock token mismatch (412).
    PreconditionFailed,
    /// Any other filesystem failure (500).
    FatalIo,
}

impl ResourceError {
    /// Wraps an I/O error together with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ResourceError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::NotFound(_) => ErrorKind::NotFound,
            ResourceError::AlreadyExists(_) | ResourceError::Conflict(_) => ErrorKind::Conflict,
            ResourceError::Unauthorized => ErrorKind::Unauthorized,
            ResourceError::Forbidden(_)
            | ResourceError::OutsideRoot(_)
            | ResourceError::InvalidName(_) => ErrorKind::Forbidden,
            ResourceError::Locked { .. } => ErrorKind::Locked,
            ResourceError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            ResourceError::InvalidRoot(_) | ResourceError::Io { .. } => ErrorKind::FatalIo,
        }
    }
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
