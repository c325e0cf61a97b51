//! Error handling and mapping for the WebDAV server.
//!
//! Resource-layer failures are classified by [`ErrorKind`] and turned into
//! the `FsError` values dav-server understands. Lock conflicts never reach
//! this mapping as 423/412: dav-server asks the lock system first and
//! answers those itself.

use dav_server::fs::FsError;
use dirdav_core::{ErrorKind, ResourceError};
use std::io;
use thiserror::Error;

/// WebDAV-specific errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum WebDavError {
    /// Resource layer error (boxed to reduce enum size).
    #[error("Resource operation failed: {0}")]
    Resource(Box<ResourceError>),

    /// A blocking worker failed to complete.
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl WebDavError {
    /// Converts this error to a dav-server FsError.
    pub fn to_fs_error(&self) -> FsError {
        match self {
            WebDavError::Resource(e) => resource_error_to_fs_error(e),
            WebDavError::Worker(_) => FsError::GeneralFailure,
        }
    }
}

/// dav-server mapping for a resource error class.
fn kind_to_fs_error(kind: ErrorKind) -> FsError {
    match kind {
        ErrorKind::NotFound => FsError::NotFound,
        ErrorKind::Conflict => FsError::Exists,
        ErrorKind::Unauthorized
        | ErrorKind::Forbidden
        | ErrorKind::Locked
        | ErrorKind::PreconditionFailed => FsError::Forbidden,
        ErrorKind::FatalIo => FsError::GeneralFailure,
    }
}

/// Converts a resource error, looking through to the IO source if any.
pub fn resource_error_to_fs_error(e: &ResourceError) -> FsError {
    match e {
        ResourceError::Io { source, .. } => io_error_to_fs_error(source),
        other => kind_to_fs_error(other.kind()),
    }
}

/// Converts an IO error to a dav-server FsError.
pub fn io_error_to_fs_error(e: &io::Error) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => FsError::NotFound,
        io::ErrorKind::AlreadyExists => FsError::Exists,
        io::ErrorKind::PermissionDenied
        | io::ErrorKind::IsADirectory
        | io::ErrorKind::DirectoryNotEmpty
        | io::ErrorKind::CrossesDevices => FsError::Forbidden,
        io::ErrorKind::StorageFull => FsError::InsufficientStorage,
        _ => FsError::GeneralFailure,
    }
}

impl From<ResourceError> for WebDavError {
    fn from(e: ResourceError) -> Self {
        WebDavError::Resource(Box::new(e))
    }
}

impl From<WebDavError> for FsError {
    fn from(e: WebDavError) -> Self {
        e.to_fs_error()
    }
}
