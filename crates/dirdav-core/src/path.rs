//! Request path resolution with root containment.
//!
//! A request path is turned into an on-disk location in two steps:
//!
//! 1. **Lexical normalization** ([`PathResolver::candidate`]): `.` segments
//!    are dropped and `..` pops one segment. Popping above the root, or any
//!    segment that is not a plain file name (drive prefixes, embedded
//!    separators, NUL bytes), is rejected with
//!    [`ResourceError::OutsideRoot`].
//! 2. **Canonical check** ([`PathResolver::contain`]): an existing candidate
//!    is canonicalized (symlinks resolved) and must still lie under the
//!    canonical root.
//!
//! The lexical candidate is the resource's identity. The canonical form is
//! only used to prove containment.

use crate::error::{ResourceError, ResourceResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Characters escaped inside a single href segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Maps request paths onto the served root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical root directory.
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for `root`.
    ///
    /// Fails with [`ResourceError::InvalidRoot`] when `root` does not exist
    /// or is not a directory.
    pub fn new(root: impl AsRef<Path>) -> ResourceResult<Self> {
        let root = root.as_ref();
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(ResourceError::InvalidRoot(root.to_path_buf())),
        }
        let root = root
            .canonicalize()
            .map_err(|e| ResourceError::io(root, e))?;
        Ok(Self { root })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically normalize `request_path` and join it onto the root.
    ///
    /// The result does not need to exist.
    pub fn candidate(&self, request_path: &str) -> ResourceResult<PathBuf> {
        let mut relative = PathBuf::new();
        for segment in request_path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if !relative.pop() {
                        return Err(ResourceError::OutsideRoot(request_path.to_string()));
                    }
                }
                name => {
                    if !is_plain_segment(name) {
                        return Err(ResourceError::OutsideRoot(request_path.to_string()));
                    }
                    relative.push(name);
                }
            }
        }
        Ok(self.root.join(relative))
    }

    /// Join a single child `name` onto `parent`.
    ///
    /// `name` must be one plain path segment.
    pub fn child(&self, parent: &Path, name: &str) -> ResourceResult<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') || !is_plain_segment(name) {
            return Err(ResourceError::InvalidName(name.to_string()));
        }
        Ok(parent.join(name))
    }

    /// Join `name` onto `parent` as the target of a write.
    ///
    /// Like [`child`](Self::child), and the result must pass
    /// [`check_writable`](Self::check_writable).
    pub fn write_target(&self, parent: &Path, name: &str) -> ResourceResult<PathBuf> {
        let target = self.child(parent, name)?;
        self.check_writable(&target)?;
        Ok(target)
    }

    /// Check that writing to `target` cannot land outside the root.
    ///
    /// The parent must exist and canonicalize under the root. A symlink at
    /// `target` itself must resolve under the root; a dangling one is
    /// refused since its destination cannot be checked.
    pub fn check_writable(&self, target: &Path) -> ResourceResult<()> {
        let parent = target
            .parent()
            .ok_or_else(|| ResourceError::OutsideRoot(target.display().to_string()))?;
        if self.contain(parent)?.is_none() {
            return Err(ResourceError::NotFound(parent.to_path_buf()));
        }
        match fs::symlink_metadata(target) {
            Ok(meta) if meta.file_type().is_symlink() => match self.contain(target)? {
                Some(_) => Ok(()),
                None => {
                    trace!(target = %target.display(), "Refusing write through dangling symlink");
                    Err(ResourceError::OutsideRoot(target.display().to_string()))
                }
            },
            Ok(_) => Ok(()),
            Err(e) if is_missing(&e) => Ok(()),
            Err(e) => Err(ResourceError::io(target, e)),
        }
    }

    /// Check that an existing `candidate` stays inside the root.
    ///
    /// Returns `Ok(None)` when nothing exists at `candidate`, and the
    /// canonical path otherwise.
    pub fn contain(&self, candidate: &Path) -> ResourceResult<Option<PathBuf>> {
        match candidate.canonicalize() {
            Ok(canonical) if canonical.starts_with(&self.root) => Ok(Some(canonical)),
            Ok(canonical) => {
                trace!(
                    candidate = %candidate.display(),
                    canonical = %canonical.display(),
                    "Candidate resolves outside root"
                );
                Err(ResourceError::OutsideRoot(candidate.display().to_string()))
            }
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(ResourceError::io(candidate, e)),
        }
    }

    /// Root-relative link for `path`, always starting with `/`.
    ///
    /// Segments are percent-encoded; collections get a trailing `/`.
    pub fn relative_href(&self, path: &Path, is_collection: bool) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut href = String::from("/");
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => {
                    Some(utf8_percent_encode(&name.to_string_lossy(), SEGMENT).to_string())
                }
                _ => None,
            })
            .collect();
        href.push_str(&segments.join("/"));
        if is_collection && !segments.is_empty() {
            href.push('/');
        }
        href
    }
}

/// A segment is plain when the platform parses it as exactly one normal
/// component.
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains('\0') {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

pub(crate) fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            PathResolver::new(&file),
            Err(ResourceError::InvalidRoot(_))
        ));
        assert!(matches!(
            PathResolver::new(dir.path().join("missing")),
            Err(ResourceError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_candidate_normalization() {
        let (_dir, r) = resolver();
        assert_eq!(r.candidate("").unwrap(), r.root());
        assert_eq!(r.candidate("/").unwrap(), r.root());
        assert_eq!(r.candidate("/a/./b/").unwrap(), r.root().join("a/b"));
        assert_eq!(r.candidate("a/b/../c").unwrap(), r.root().join("a/c"));
        assert_eq!(r.candidate("a/..").unwrap(), r.root());
    }

    #[test]
    fn test_candidate_rejects_escape() {
        let (_dir, r) = resolver();
        assert!(matches!(r.candidate(".."), Err(ResourceError::OutsideRoot(_))));
        assert!(matches!(
            r.candidate("../../etc/passwd"),
            Err(ResourceError::OutsideRoot(_))
        ));
        assert!(matches!(
            r.candidate("a/../../b"),
            Err(ResourceError::OutsideRoot(_))
        ));
        assert!(matches!(r.candidate("a\0b"), Err(ResourceError::OutsideRoot(_))));
    }

    #[test]
    fn test_child_rejects_non_segments() {
        let (_dir, r) = resolver();
        for bad in ["", ".", "..", "a/b"] {
            assert!(
                matches!(r.child(r.root(), bad), Err(ResourceError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(r.child(r.root(), "ok.txt").unwrap(), r.root().join("ok.txt"));
    }

    #[test]
    fn test_contain_missing_is_none() {
        let (_dir, r) = resolver();
        let candidate = r.candidate("nope/deeper").unwrap();
        assert!(r.contain(&candidate).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_contain_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"s").unwrap();
        let (dir, r) = resolver();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let candidate = r.candidate("link/secret").unwrap();
        assert!(matches!(
            r.contain(&candidate),
            Err(ResourceError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_write_target_plain() {
        let (dir, r) = resolver();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/old.txt"), b"x").unwrap();

        let docs = r.root().join("docs");
        assert_eq!(r.write_target(&docs, "new.txt").unwrap(), docs.join("new.txt"));
        assert_eq!(r.write_target(&docs, "old.txt").unwrap(), docs.join("old.txt"));
        assert!(matches!(
            r.write_target(&r.root().join("missing"), "a.txt"),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_target_refuses_escaping_symlinks() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("victim.txt"), b"v").unwrap();
        let (dir, r) = resolver();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("away")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("victim.txt"), dir.path().join("link"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("escaped.txt"), dir.path().join("out"))
            .unwrap();

        for name in ["link", "out"] {
            assert!(
                matches!(r.write_target(r.root(), name), Err(ResourceError::OutsideRoot(_))),
                "{name} should be refused"
            );
        }
        assert!(matches!(
            r.write_target(&r.root().join("away"), "new.txt"),
            Err(ResourceError::OutsideRoot(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_target_allows_inner_symlink() {
        let (dir, r) = resolver();
        fs::write(dir.path().join("real.txt"), b"r").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias")).unwrap();

        assert!(r.write_target(r.root(), "alias").is_ok());
    }

    #[test]
    fn test_relative_href() {
        let (_dir, r) = resolver();
        assert_eq!(r.relative_href(r.root(), true), "/");
        assert_eq!(r.relative_href(&r.root().join("a b/c.txt"), false), "/a%20b/c.txt");
        assert_eq!(r.relative_href(&r.root().join("docs"), true), "/docs/");
    }
}
