//! File resources.

use crate::collection::Collection;
use crate::content_type;
use crate::error::{ResourceError, ResourceResult};
use crate::lock::{LockInfo, LockRefusal, LockTimeout, LockToken};
use crate::resource::{FormProcessor, Lockable, Node, Replaceable};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// A regular file inside the served root.
#[derive(Debug, Clone)]
pub struct Item {
    node: Node,
}

impl Item {
    pub(crate) fn from_node(node: Node) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub fn path(&self) -> &Path {
        &self.node.path
    }

    pub fn name(&self) -> String {
        self.node.name()
    }

    pub fn href(&self) -> String {
        self.node.href(false)
    }

    /// Copy the whole file to `out`.
    pub fn send_content(&self, out: &mut dyn Write) -> ResourceResult<u64> {
        let mut file = self.open_content()?;
        let copied = io::copy(&mut file, out).map_err(|e| ResourceError::io(self.path(), e))?;
        out.flush().map_err(|e| ResourceError::io(self.path(), e))?;
        Ok(copied)
    }

    /// Open the file for reading.
    pub fn open_content(&self) -> ResourceResult<File> {
        File::open(self.path()).map_err(|e| ResourceError::io(self.path(), e))
    }

    pub fn content_length(&self) -> ResourceResult<u64> {
        fs::metadata(self.path())
            .map(|m| m.len())
            .map_err(|e| ResourceError::io(self.path(), e))
    }

    pub fn content_type(&self, accepts: Option<&str>) -> Option<String> {
        content_type::negotiate(&self.name(), accepts)
    }

    pub fn modified(&self) -> ResourceResult<SystemTime> {
        self.node.modified()
    }

    /// Birth time as reported by the filesystem.
    pub fn created(&self) -> ResourceResult<SystemTime> {
        fs::metadata(self.path())
            .and_then(|m| m.created())
            .map_err(|e| ResourceError::io(self.path(), e))
    }

    /// Copy to `dest/new_name`, overwriting any file there.
    pub fn copy_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Item> {
        let target = self.node.destination(dest, new_name)?;
        if target == self.path() {
            return Err(ResourceError::Conflict(format!(
                "cannot copy {} onto itself",
                self.path().display()
            )));
        }
        fs::copy(self.path(), &target).map_err(|e| ResourceError::io(&target, e))?;
        debug!(from = %self.path().display(), to = %target.display(), "Copied item");
        Ok(Item::from_node(Node {
            path: target,
            shared: self.node.shared.clone(),
        }))
    }

    /// Rename to `dest/new_name`. Locks on the old identity are dropped.
    pub fn move_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Item> {
        let target = self.node.destination(dest, new_name)?;
        if target == self.path() {
            return Err(ResourceError::Conflict(format!(
                "cannot move {} onto itself",
                self.path().display()
            )));
        }
        fs::rename(self.path(), &target).map_err(|e| ResourceError::io(self.path(), e))?;
        self.node.shared.locks.forget(self.path());
        debug!(from = %self.path().display(), to = %target.display(), "Moved item");
        Ok(Item::from_node(Node {
            path: target,
            shared: self.node.shared.clone(),
        }))
    }

    pub fn delete(&self) -> ResourceResult<()> {
        fs::remove_file(self.path()).map_err(|e| ResourceError::io(self.path(), e))?;
        self.node.shared.locks.forget(self.path());
        debug!(path = %self.path().display(), "Deleted item");
        Ok(())
    }

    fn refused(&self, refusal: LockRefusal) -> ResourceError {
        match refusal {
            LockRefusal::Locked(held) => ResourceError::Locked {
                path: self.path().to_path_buf(),
                token: held.token,
            },
            LockRefusal::UnknownToken(token) => ResourceError::PreconditionFailed(token),
        }
    }
}

impl Lockable for Item {
    fn lock(&self, timeout: LockTimeout, info: &LockInfo) -> ResourceResult<LockToken> {
        self.node
            .shared
            .locks
            .grant(timeout, info, self.path())
            .map_err(|r| self.refused(r))
    }

    fn refresh_lock(&self, token: &str, timeout: LockTimeout) -> ResourceResult<LockToken> {
        self.node
            .shared
            .locks
            .refresh(token, timeout, self.path())
            .map_err(|r| self.refused(r))
    }

    fn unlock(&self, token: &str) -> ResourceResult<()> {
        self.node
            .shared
            .locks
            .release(token, self.path())
            .map_err(|r| self.refused(r))
    }

    fn current_lock(&self) -> Option<LockToken> {
        self.node.shared.locks.current_token(self.path())
    }
}

impl Replaceable for Item {
    fn replace_content(&self, reader: &mut dyn Read, length: Option<u64>) -> ResourceResult<u64> {
        let written = write_stream(self.path(), reader, length)?;
        debug!(path = %self.path().display(), written, "Replaced item content");
        Ok(written)
    }
}

impl FormProcessor for Item {
    fn process_form(&self, params: &HashMap<String, String>) -> ResourceResult<Option<String>> {
        debug!(path = %self.path().display(), fields = params.len(), "Declining form submission");
        Ok(None)
    }
}

/// Create or truncate `path` and drain `reader` into it.
pub(crate) fn write_stream(
    path: &Path,
    reader: &mut dyn Read,
    length: Option<u64>,
) -> ResourceResult<u64> {
    let file = File::create(path).map_err(|e| ResourceError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(reader, &mut writer).map_err(|e| ResourceError::io(path, e))?;
    writer.flush().map_err(|e| ResourceError::io(path, e))?;

    if let Some(expected) = length
        && written < expected
    {
        warn!(
            path = %path.display(),
            expected,
            written,
            "Stream ended before the announced length"
        );
    }
    Ok(written)
}
