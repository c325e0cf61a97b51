//! WebDAV filesystem backed by the resource layer.
//!
//! This module provides the `DavFileSystem` implementation that turns
//! dav-server calls into [`ResourceFactory`] lookups and resource
//! operations. The resource layer is blocking, so every call runs on
//! tokio's blocking pool.

use crate::dir_entry::ResourceDirEntry;
use crate::error::WebDavError;
use crate::file::ResourceFile;
use crate::metadata::ResourceMetaData;
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsStream, OpenOptions,
    ReadDirMeta,
};
use dirdav_core::{Collection, Resource, ResourceError, ResourceFactory, ResourceResult};
use futures::stream;
use std::io::{self, Read};
use std::pin::Pin;
use tracing::{debug, error, instrument, trace};

/// Run a blocking resource operation off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, FsError>
where
    F: FnOnce() -> ResourceResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| {
            trace!(error = %e, "Resource operation failed");
            WebDavError::from(e).into()
        }),
        Err(e) => {
            error!(error = %e, "Blocking worker failed");
            Err(WebDavError::Worker(e.to_string()).into())
        }
    }
}

/// WebDAV filesystem over a served directory tree.
#[derive(Debug, Clone)]
pub struct DirDavFs {
    factory: ResourceFactory,
}

/// What `open` found and decided, computed in one blocking step.
enum Opened {
    Read(std::fs::File, ResourceMetaData),
    Write(dirdav_core::Item, Vec<u8>, bool),
}

impl DirDavFs {
    /// Create a filesystem over `factory`.
    pub fn new(factory: ResourceFactory) -> Self {
        Self { factory }
    }

    /// Request path for the resource layer, decoded and `/`-separated.
    pub(crate) fn request_path(path: &DavPath) -> String {
        let relative = path.as_rel_ospath().to_string_lossy().into_owned();
        trace!(raw_path = %path.as_url_string(), relative = %relative, "request_path");
        relative
    }

    /// Split a request path into parent path and final segment.
    fn split_parent(path: &str) -> Option<(String, String)> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rsplit_once('/') {
            Some((parent, name)) => Some((parent.to_string(), name.to_string())),
            None => Some((String::new(), trimmed.to_string())),
        }
    }

    fn resolve_existing(factory: &ResourceFactory, path: &str) -> ResourceResult<Resource> {
        factory
            .resolve(path)?
            .ok_or_else(|| ResourceError::NotFound(path.into()))
    }

    fn resolve_parent(factory: &ResourceFactory, path: &str) -> ResourceResult<(Collection, String)> {
        let (parent, name) = Self::split_parent(path)
            .ok_or_else(|| ResourceError::Forbidden("the root has no parent".to_string()))?;
        match Self::resolve_existing(factory, &parent)? {
            Resource::Collection(c) => Ok((c, name)),
            Resource::Item(_) => Err(ResourceError::NotFound(parent.into())),
        }
    }

    fn open_blocking(
        factory: &ResourceFactory,
        path: &str,
        options: OpenOptions,
    ) -> ResourceResult<Opened> {
        let existing = factory.resolve(path)?;
        let writing = options.write || options.append || options.create || options.create_new;

        if !writing {
            return match existing {
                Some(Resource::Item(item)) => {
                    let meta = ResourceMetaData::snapshot(&Resource::Item(item.clone()))?;
                    Ok(Opened::Read(item.open_content()?, meta))
                }
                Some(Resource::Collection(_)) => {
                    Err(ResourceError::Forbidden(format!("{path} is a collection")))
                }
                None => Err(ResourceError::NotFound(path.into())),
            };
        }

        match existing {
            Some(Resource::Collection(_)) => {
                Err(ResourceError::Forbidden(format!("{path} is a collection")))
            }
            Some(Resource::Item(item)) => {
                if options.create_new {
                    return Err(ResourceError::AlreadyExists(item.path().to_path_buf()));
                }
                if options.truncate {
                    return Ok(Opened::Write(item, Vec::new(), true));
                }
                let mut content = Vec::new();
                item.open_content()?
                    .read_to_end(&mut content)
                    .map_err(|e| ResourceError::io(item.path(), e))?;
                Ok(Opened::Write(item, content, false))
            }
            None if options.create || options.create_new => {
                let (parent, name) = Self::resolve_parent(factory, path)?;
                let item = parent.create_item(&name, &mut io::empty(), Some(0), None)?;
                Ok(Opened::Write(item, Vec::new(), true))
            }
            None => Err(ResourceError::NotFound(path.into())),
        }
    }
}

impl DavFileSystem for DirDavFs {
    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            debug!(path = %request_path, options = ?options, "Opening file");
            let factory = self.factory.clone();

            let opened = blocking(move || Self::open_blocking(&factory, &request_path, options)).await?;
            let file = match opened {
                Opened::Read(file, meta) => ResourceFile::reader(file, meta),
                Opened::Write(item, content, dirty) => ResourceFile::writer(item, content, dirty),
            };
            Ok(Box::new(file) as Box<dyn DavFile>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            debug!(path = %request_path, "Reading directory");
            let factory = self.factory.clone();

            let metas = blocking(move || {
                let Resource::Collection(collection) = Self::resolve_existing(&factory, &request_path)?
                else {
                    return Err(ResourceError::Forbidden(format!("{request_path} is not a collection")));
                };
                let mut metas = Vec::new();
                for child in collection.children()? {
                    match ResourceMetaData::snapshot(&child) {
                        Ok(meta) => metas.push(meta),
                        // Removed between listing and stat.
                        Err(ResourceError::Io { source, .. })
                            if source.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(metas)
            })
            .await?;

            trace!(count = metas.len(), "Directory entries found");
            let entries: Vec<Box<dyn DavDirEntry>> = metas
                .into_iter()
                .map(|meta| Box::new(ResourceDirEntry::new(meta)) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<_>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            let factory = self.factory.clone();
            let meta = blocking(move || {
                ResourceMetaData::snapshot(&Self::resolve_existing(&factory, &request_path)?)
            })
            .await?;
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            debug!(path = %request_path, "Creating directory");
            let factory = self.factory.clone();
            blocking(move || {
                let (parent, name) = Self::resolve_parent(&factory, &request_path)?;
                parent.create_collection(&name).map(|_| ())
            })
            .await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            debug!(path = %request_path, "Removing directory");
            let factory = self.factory.clone();
            blocking(move || Self::resolve_existing(&factory, &request_path)?.delete()).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let request_path = Self::request_path(path);
            debug!(path = %request_path, "Removing file");
            let factory = self.factory.clone();
            blocking(move || Self::resolve_existing(&factory, &request_path)?.delete()).await
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from_path = Self::request_path(from);
            let to_path = Self::request_path(to);
            debug!(from = %from_path, to = %to_path, "Renaming/moving");
            let factory = self.factory.clone();
            blocking(move || {
                let source = Self::resolve_existing(&factory, &from_path)?;
                let (dest, name) = Self::resolve_parent(&factory, &to_path)?;
                source.move_to(&dest, &name).map(|_| ())
            })
            .await
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from_path = Self::request_path(from);
            let to_path = Self::request_path(to);
            debug!(from = %from_path, to = %to_path, "Copying");
            let factory = self.factory.clone();
            blocking(move || {
                let source = Self::resolve_existing(&factory, &from_path)?;
                let (dest, name) = Self::resolve_parent(&factory, &to_path)?;
                source.copy_to(&dest, &name).map(|_| ())
            })
            .await
        })
    }

    fn have_props<'a>(
        &'a self,
        _path: &'a DavPath,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        // Dead properties are not stored.
        Box::pin(async { false })
    }
}
