//! Directory resources.

use crate::content_type;
use crate::error::{ResourceError, ResourceResult};
use crate::item::{write_stream, Item};
use crate::resource::{Node, Resource};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A directory inside the served root.
#[derive(Debug, Clone)]
pub struct Collection {
    node: Node,
}

impl Collection {
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

    /// Whether this is the served root itself.
    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    pub fn href(&self) -> String {
        self.node.href(true)
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> ResourceResult<Option<Resource>> {
        let path = self.node.shared.resolver.child(self.path(), name)?;
        Resource::at(&self.node.shared, path)
    }

    /// Direct children in filesystem order.
    ///
    /// Entries that vanish mid-listing are left out, as are entries that
    /// resolve outside the root.
    pub fn children(&self) -> ResourceResult<Vec<Resource>> {
        let entries = fs::read_dir(self.path()).map_err(|e| ResourceError::io(self.path(), e))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ResourceError::io(self.path(), e))?;
            let path = self.path().join(entry.file_name());
            match Resource::at(&self.node.shared, path) {
                Ok(Some(child)) => children.push(child),
                Ok(None) => {}
                Err(ResourceError::OutsideRoot(target)) => {
                    warn!(target = %target, "Skipping entry that escapes the root");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(children)
    }

    /// Create a subdirectory.
    pub fn create_collection(&self, name: &str) -> ResourceResult<Collection> {
        let path = self.node.shared.resolver.write_target(self.path(), name)?;
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ResourceError::AlreadyExists(path));
            }
            Err(e) => return Err(ResourceError::io(&path, e)),
        }
        debug!(path = %path.display(), "Created collection");
        Ok(Collection::from_node(Node {
            path,
            shared: self.node.shared.clone(),
        }))
    }

    /// Create or truncate a file and fill it from `reader`.
    ///
    /// `length` and `content_type` are informational only.
    pub fn create_item(
        &self,
        name: &str,
        reader: &mut dyn Read,
        length: Option<u64>,
        content_type: Option<&str>,
    ) -> ResourceResult<Item> {
        let path = self.node.shared.resolver.write_target(self.path(), name)?;
        let written = write_stream(&path, reader, length)?;
        debug!(
            path = %path.display(),
            written,
            declared_length = ?length,
            content_type = ?content_type,
            "Created item"
        );
        Ok(Item::from_node(Node {
            path,
            shared: self.node.shared.clone(),
        }))
    }

    /// Recursively copy this directory to `dest/new_name`.
    ///
    /// A partial copy is left in place if any step fails. Symlinks inside
    /// the tree are not copied.
    pub fn copy_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Collection> {
        let target = self.node.destination(dest, new_name)?;
        if target.starts_with(self.path()) {
            return Err(ResourceError::Conflict(format!(
                "cannot copy {} into itself",
                self.path().display()
            )));
        }

        for entry in WalkDir::new(self.path()).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(self.path()).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop"));
                ResourceError::io(path, source)
            })?;
            let Ok(relative) = entry.path().strip_prefix(self.path()) else {
                continue;
            };
            let out = target.join(relative);
            self.node.shared.resolver.check_writable(&out)?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                fs::create_dir_all(&out).map_err(|e| ResourceError::io(&out, e))?;
            } else if file_type.is_file() {
                fs::copy(entry.path(), &out).map_err(|e| ResourceError::io(&out, e))?;
            } else {
                warn!(path = %entry.path().display(), "Not copying special file");
            }
        }

        debug!(from = %self.path().display(), to = %target.display(), "Copied collection");
        Ok(Collection::from_node(Node {
            path: target,
            shared: self.node.shared.clone(),
        }))
    }

    /// Rename this directory to `dest/new_name`.
    ///
    /// Fails rather than falling back to copy and delete.
    pub fn move_to(&self, dest: &Collection, new_name: &str) -> ResourceResult<Collection> {
        if self.is_root() {
            return Err(ResourceError::Forbidden("cannot move the root".to_string()));
        }
        let target = self.node.destination(dest, new_name)?;
        if target.starts_with(self.path()) {
            return Err(ResourceError::Conflict(format!(
                "cannot move {} into itself",
                self.path().display()
            )));
        }
        fs::rename(self.path(), &target).map_err(|e| ResourceError::io(self.path(), e))?;
        self.node.shared.locks.forget(self.path());

        debug!(from = %self.path().display(), to = %target.display(), "Moved collection");
        Ok(Collection::from_node(Node {
            path: target,
            shared: self.node.shared.clone(),
        }))
    }

    /// Remove this directory and everything in it.
    pub fn delete(&self) -> ResourceResult<()> {
        if self.is_root() {
            return Err(ResourceError::Forbidden("cannot delete the root".to_string()));
        }
        fs::remove_dir_all(self.path()).map_err(|e| ResourceError::io(self.path(), e))?;
        self.node.shared.locks.forget(self.path());
        debug!(path = %self.path().display(), "Deleted collection");
        Ok(())
    }

    /// Write an HTML listing of the direct children.
    pub fn send_content(&self, out: &mut dyn Write) -> ResourceResult<u64> {
        let page = self.render_listing()?;
        out.write_all(page.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| ResourceError::io(self.path(), e))?;
        Ok(page.len() as u64)
    }

    /// The HTML listing as a string.
    pub fn render_listing(&self) -> ResourceResult<String> {
        let title = escape_html(&self.href());
        let mut page = format!(
            "<html><head><title>Folder listing for {title}</title></head>\n<body>\n<h1>Folder listing for {title}</h1>\n<ul>\n"
        );
        for child in self.children()? {
            page.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                escape_html(&child.href()),
                escape_html(&child.name())
            ));
        }
        page.push_str("</ul>\n</body></html>\n");
        Ok(page)
    }

    pub fn content_type(&self, accepts: Option<&str>) -> Option<String> {
        content_type::negotiate(&self.name(), accepts)
    }

    pub fn content_length(&self) -> Option<u64> {
        None
    }

    pub fn created(&self) -> Option<SystemTime> {
        None
    }

    pub fn modified(&self) -> ResourceResult<SystemTime> {
        self.node.modified()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
