//! WebDAV directory entries for collection listings.

use crate::metadata::ResourceMetaData;
use dav_server::fs::{DavDirEntry, DavMetaData, FsFuture};

/// One child of a listed collection.
#[derive(Debug, Clone)]
pub struct ResourceDirEntry {
    meta: ResourceMetaData,
}

impl ResourceDirEntry {
    pub fn new(meta: ResourceMetaData) -> Self {
        Self { meta }
    }
}

impl DavDirEntry for ResourceDirEntry {
    fn name(&self) -> Vec<u8> {
        self.meta.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        let is_dir = self.meta.is_dir;
        Box::pin(async move { Ok(is_dir) })
    }

    fn is_file(&self) -> FsFuture<'_, bool> {
        let is_file = !self.meta.is_dir;
        Box::pin(async move { Ok(is_file) })
    }

    fn is_symlink(&self) -> FsFuture<'_, bool> {
        // Symlinks are resolved before listing.
        Box::pin(async { Ok(false) })
    }
}
