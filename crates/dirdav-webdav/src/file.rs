//! WebDAV file handle implementation.
//!
//! Reads stream straight from the underlying file. Writes are buffered in
//! memory and handed to the item's content replacement on flush.

use crate::filesystem::blocking;
use crate::metadata::ResourceMetaData;
use bytes::{Buf, Bytes};
use dav_server::fs::{DavFile, DavMetaData, FsError, FsFuture};
use dirdav_core::{Item, Replaceable};
use std::fmt;
use std::io::{Cursor, SeekFrom};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::debug;

/// A file handle for WebDAV operations.
pub enum ResourceFile {
    /// Read-only handle for GET requests.
    Reader(ReaderHandle),
    /// Write buffer for PUT requests.
    Writer(WriterHandle),
}

impl fmt::Debug for ResourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceFile::Reader(h) => f
                .debug_struct("ResourceFile::Reader")
                .field("name", &h.meta.name)
                .field("size", &h.meta.len)
                .finish_non_exhaustive(),
            ResourceFile::Writer(h) => f
                .debug_struct("ResourceFile::Writer")
                .field("path", &h.item.path())
                .field("position", &h.position)
                .field("dirty", &h.dirty)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle for read-only file access.
pub struct ReaderHandle {
    file: Mutex<tokio::fs::File>,
    meta: ResourceMetaData,
}

/// Handle for buffered write access.
pub struct WriterHandle {
    item: Item,
    buffer: Vec<u8>,
    position: u64,
    dirty: bool,
}

impl ResourceFile {
    /// Wrap an open file for reading.
    pub fn reader(file: std::fs::File, meta: ResourceMetaData) -> Self {
        ResourceFile::Reader(ReaderHandle {
            file: Mutex::new(tokio::fs::File::from_std(file)),
            meta,
        })
    }

    /// Start a write buffer for `item` holding `initial` content.
    ///
    /// A fresh buffer is dirty so that an empty PUT still truncates.
    pub fn writer(item: Item, initial: Vec<u8>, dirty: bool) -> Self {
        ResourceFile::Writer(WriterHandle {
            item,
            buffer: initial,
            position: 0,
            dirty,
        })
    }
}

impl WriterHandle {
    /// Write `data` at the current position, growing the buffer as needed.
    fn write_at_position(&mut self, data: &[u8]) -> Result<(), FsError> {
        let end = usize::try_from(self.position)
            .ok()
            .and_then(|start| start.checked_add(data.len()))
            .ok_or(FsError::TooLarge)?;
        let start = end - data.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);
        self.position = end as u64;
        self.dirty = true;
        Ok(())
    }

    fn read_at_position(&mut self, count: usize) -> Bytes {
        let start = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(self.buffer.len());
        let end = start.saturating_add(count).min(self.buffer.len());
        self.position = end as u64;
        Bytes::copy_from_slice(&self.buffer[start..end])
    }
}

impl DavFile for ResourceFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let meta = match self {
                ResourceFile::Reader(h) => h.meta.clone(),
                ResourceFile::Writer(h) => {
                    ResourceMetaData::file_with_size(h.item.name(), h.buffer.len() as u64)
                }
            };
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        Box::pin(async move {
            match self {
                ResourceFile::Reader(h) => {
                    let mut file = h.file.lock().await;
                    let mut data = vec![0u8; count];
                    let mut filled = 0;
                    while filled < count {
                        let n = file
                            .read(&mut data[filled..])
                            .await
                            .map_err(|e| crate::error::io_error_to_fs_error(&e))?;
                        if n == 0 {
                            break;
                        }
                        filled += n;
                    }
                    data.truncate(filled);
                    Ok(Bytes::from(data))
                }
                ResourceFile::Writer(h) => Ok(h.read_at_position(count)),
            }
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            match self {
                ResourceFile::Reader(_) => Err(FsError::Forbidden),
                ResourceFile::Writer(h) => {
                    h.write_at_position(&buf)
                }
            }
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let bytes = buf.copy_to_bytes(buf.remaining());
            self.write_bytes(bytes).await
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            match self {
                ResourceFile::Reader(h) => {
                    let mut file = h.file.lock().await;
                    file.seek(pos)
                        .await
                        .map_err(|e| crate::error::io_error_to_fs_error(&e))
                }
                ResourceFile::Writer(h) => {
                    let (base, offset) = match pos {
                        SeekFrom::Start(n) => (0i64, i64::try_from(n).unwrap_or(i64::MAX)),
                        SeekFrom::End(n) => (h.buffer.len() as i64, n),
                        SeekFrom::Current(n) => (i64::try_from(h.position).unwrap_or(i64::MAX), n),
                    };
                    // The buffer never grows through a seek.
                    let new_pos = u64::try_from(base.saturating_add(offset))
                        .ok()
                        .filter(|&n| n <= h.buffer.len() as u64)
                        .ok_or(FsError::NotImplemented)?;
                    h.position = new_pos;
                    Ok(new_pos)
                }
            }
        })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move {
            match self {
                ResourceFile::Reader(_) => Ok(()),
                ResourceFile::Writer(h) => {
                    if !h.dirty {
                        return Ok(());
                    }
                    let item = h.item.clone();
                    let content = h.buffer.clone();
                    let size = content.len() as u64;
                    debug!(path = %item.path().display(), size, "Flushing write buffer");

                    blocking(move || {
                        item.replace_content(&mut Cursor::new(content), Some(size))
                    })
                    .await?;
                    h.dirty = false;
                    Ok(())
                }
            }
        })
    }
}
