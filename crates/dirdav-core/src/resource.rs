//! The resource sum type and the capabilities only some resources have.
//!
//! A [`Resource`] is a short-lived view: an identity (absolute path) plus a
//! handle to the factory's shared context. Nothing about the filesystem is
//! cached, every query goes back to disk.

use crate::access::{Principal, RequestContext};
use crate::collection::Collection;
use crate::error::{ResourceError, ResourceResult};
use crate::factory::Shared;
use crate::item::Item;
use crate::lock::{LockInfo, LockTimeout, LockToken};
use crate::path::is_missing;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

/// A directory or a file inside the served root.
#[derive(Debug, Clone)]
pub enum Resource {
    Collection(Collection),
    Item(Item),
}

impl Resource {
    /// Build the resource at `path` if something exists there.
    ///
    /// `path` is the lexical identity; containment is verified against its
    /// canonical form.
    pub(crate) fn at(shared: &Arc<Shared>, path: PathBuf) -> ResourceResult<Option<Resource>> {
        let Some(canonical) = shared.resolver.contain(&path)? else {
            trace!(path = %path.display(), "Nothing at path");
            return Ok(None);
        };
        let meta = match fs::metadata(&canonical) {
            Ok(meta) => meta,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(ResourceError::io(&path, e)),
        };
        let node = Node {
            path,
            shared: Arc::clone(shared),
        };
        Ok(Some(if meta.is_dir() {
            Resource::Collection(Collection::from_node(node))
        } else {
            Resource::Item(Item::from_node(node))
        }))
    }

    fn node(&self) -> &Node {
        match self {
            Resource::Collection(c) => c.node(),
            Resource::Item(i) => i.node(),
        }
    }

    /// Absolute filesystem path; also the unique id.
    pub fn path(&self) -> &Path {
        &self.node().path
    }

    /// Unique id as a string.
    pub fn identity(&self) -> String {
        self.node().identity()
    }

    /// Final path segment, or the root directory's own name.
    pub fn name(&self) -> String {
        self.node().name()
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Resource::Collection(_))
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Resource::Collection(c) => Some(c),
            Resource::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Resource::Item(i) => Some(i),
            Resource::Collection(_) => None,
        }
    }

    /// Root-relative link for this resource.
    pub fn href(&self) -> String {
        self.node().href(self.is_collection())
    }

    pub fn modified(&self) -> ResourceResult<SystemTime> {
        self.node().modified()
    }

    /// Creation time. Collections report none.
    pub fn created(&self) -> ResourceResult<Option<SystemTime>> {
        match self {
            Resource::Collection(c) => Ok(c.created()),
            Resource::Item(i) => i.created().map(Some),
        }
    }

    /// Byte length. Collections report none.
    pub fn content_length(&self) -> ResourceResult<Option<u64>> {
        match self {
            Resource::Collection(c) => Ok(c.content_length()),
            Resource::Item(i) => i.content_length().map(Some),
        }
    }

    pub fn content_type(&self, accepts: Option<&str>) -> Option<String> {
        match self {
            Resource::Collection(c) => c.content_type(accepts),
            Resource::Item(i) => i.content_type(accepts),
        }
    }

    /// Write the resource body: file bytes or a directory listing.
    pub fn send_content(&self, out: &mut dyn Write) -> ResourceResult<u64> {
        match self {
            Resource::Collection(c) => c.send_content(out),
            Resource::Item(i) => i.send_content(out),
        }
    }

    pub fn copy_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Resource> {
        match self {
            Resource::Collection(c) => c.copy_to(dest, new_name).map(Resource::Collection),
            Resource::Item(i) => i.copy_to(dest, new_name).map(Resource::Item),
        }
    }

    pub fn move_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Resource> {
        match self {
            Resource::Collection(c) => c.move_to(dest, new_name).map(Resource::Collection),
            Resource::Item(i) => i.move_to(dest, new_name).map(Resource::Item),
        }
    }

    pub fn delete(&self) -> ResourceResult<()> {
        match self {
            Resource::Collection(c) => c.delete(),
            Resource::Item(i) => i.delete(),
        }
    }

    /// Authentication realm: the identity.
    pub fn realm(&self) -> String {
        self.node().identity()
    }

    /// Check a user/password pair. Open access accepts anyone.
    pub fn authenticate(&self, user: &str, password: &str) -> Option<Principal> {
        match &self.node().shared.policy {
            Some(policy) => policy.authenticate(user, password),
            None => Some(Principal::new(user)),
        }
    }

    /// Decide whether `principal` may perform `request` here.
    pub fn authorize(&self, request: &RequestContext, principal: Option<&Principal>) -> bool {
        match &self.node().shared.policy {
            Some(policy) => policy.authorize(request, principal, self),
            None => true,
        }
    }
}

/// State common to collections and items.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) path: PathBuf,
    pub(crate) shared: Arc<Shared>,
}

impl Node {
    pub(crate) fn identity(&self) -> String {
        self.path.display().to_string()
    }

    pub(crate) fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn is_root(&self) -> bool {
        self.path == self.shared.resolver.root()
    }

    pub(crate) fn href(&self, is_collection: bool) -> String {
        self.shared.resolver.relative_href(&self.path, is_collection)
    }

    pub(crate) fn modified(&self) -> ResourceResult<SystemTime> {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| ResourceError::io(&self.path, e))
    }

    /// Target path for a copy or move into `dest`.
    pub(crate) fn destination(&self, dest: &Collection, new_name: &str) -> ResourceResult<PathBuf> {
        self.shared.resolver.write_target(dest.path(), new_name)
    }
}

/// Resources that take part in exclusive locking.
pub trait Lockable {
    /// Acquire an exclusive lock. Refused with [`ResourceError::Locked`].
    fn lock(&self, timeout: LockTimeout, info: &LockInfo) -> ResourceResult<LockToken>;

    /// Extend a held lock. Unknown tokens give
    /// [`ResourceError::PreconditionFailed`].
    fn refresh_lock(&self, token: &str, timeout: LockTimeout) -> ResourceResult<LockToken>;

    /// Release a held lock.
    fn unlock(&self, token: &str) -> ResourceResult<()>;

    /// The active lock, if any.
    fn current_lock(&self) -> Option<LockToken>;
}

/// Resources whose content can be overwritten in place.
pub trait Replaceable {
    fn replace_content(&self, reader: &mut dyn Read, length: Option<u64>) -> ResourceResult<u64>;
}

/// Resources that may handle form submissions.
pub trait FormProcessor {
    /// Handle posted form parameters. `None` declines.
    fn process_form(&self, params: &HashMap<String, String>) -> ResourceResult<Option<String>>;
}
