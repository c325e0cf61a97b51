//! WebDAV metadata for resources.
//!
//! Metadata is a snapshot taken inside a blocking worker, so dav-server can
//! query it synchronously afterwards.

use dav_server::fs::{DavMetaData, FsError};
use dirdav_core::{Resource, ResourceError, ResourceResult};
use std::io;
use std::time::SystemTime;
use tracing::trace;

/// Point-in-time metadata for a collection or an item.
#[derive(Debug, Clone)]
pub struct ResourceMetaData {
    /// Final path segment.
    pub name: String,
    /// Directory flag.
    pub is_dir: bool,
    /// Byte length, 0 for collections.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Birth time if the filesystem reports one.
    pub created: Option<SystemTime>,
}

impl ResourceMetaData {
    /// Read the current metadata of `resource`.
    pub fn snapshot(resource: &Resource) -> ResourceResult<Self> {
        Ok(Self {
            name: resource.name(),
            is_dir: resource.is_collection(),
            len: resource.content_length()?.unwrap_or(0),
            modified: resource.modified()?,
            created: birth_time(resource.created())?,
        })
    }

    /// Metadata for an open write handle.
    pub fn file_with_size(name: String, size: u64) -> Self {
        Self {
            name,
            is_dir: false,
            len: size,
            modified: SystemTime::now(),
            created: None,
        }
    }
}

/// A filesystem without birth times reports none; other failures propagate.
fn birth_time(created: ResourceResult<Option<SystemTime>>) -> ResourceResult<Option<SystemTime>> {
    match created {
        Err(ResourceError::Io { path, source }) if source.kind() == io::ErrorKind::Unsupported => {
            trace!(path = %path.display(), "No creation time");
            Ok(None)
        }
        other => other,
    }
}

impl DavMetaData for ResourceMetaData {
    fn len(&self) -> u64 {
        self.len
    }

    fn modified(&self) -> Result<SystemTime, FsError> {
        Ok(self.modified)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn is_file(&self) -> bool {
        !self.is_dir
    }

    fn created(&self) -> Result<SystemTime, FsError> {
        self.created.ok_or(FsError::NotImplemented)
    }
}
