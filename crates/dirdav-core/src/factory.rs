//! Entry point turning request paths into resources.

use crate::access::{AccessPolicy, CredentialPolicy, Credentials};
use crate::collection::Collection;
use crate::error::{ResourceError, ResourceResult};
use crate::lock::{LockCoordinator, LockTable};
use crate::path::PathResolver;
use crate::resource::Resource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Context shared by every resource a factory creates.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) resolver: PathResolver,
    pub(crate) locks: Arc<dyn LockCoordinator>,
    pub(crate) policy: Option<Arc<dyn AccessPolicy>>,
}

/// Resolves request paths under a fixed root.
///
/// Cloning is cheap; clones share the lock coordinator and access policy.
#[derive(Debug, Clone)]
pub struct ResourceFactory {
    shared: Arc<Shared>,
}

impl ResourceFactory {
    /// Serve `root` with an in-memory lock table.
    ///
    /// Empty `credentials` means open access.
    pub fn new(root: impl AsRef<Path>, credentials: Credentials) -> ResourceResult<Self> {
        let policy: Option<Arc<dyn AccessPolicy>> = if credentials.is_empty() {
            None
        } else {
            Some(Arc::new(CredentialPolicy::new(credentials)))
        };
        Self::with_components(root, Arc::new(LockTable::new()), policy)
    }

    /// Serve `root` with injected collaborators.
    pub fn with_components(
        root: impl AsRef<Path>,
        locks: Arc<dyn LockCoordinator>,
        policy: Option<Arc<dyn AccessPolicy>>,
    ) -> ResourceResult<Self> {
        let resolver = PathResolver::new(root)?;
        info!(
            root = %resolver.root().display(),
            open_access = policy.is_none(),
            "Resource factory ready"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                resolver,
                locks,
                policy,
            }),
        })
    }

    /// Resolve `request_path` to a resource.
    ///
    /// `Ok(None)` means nothing exists there. Paths escaping the root fail
    /// with [`ResourceError::OutsideRoot`].
    pub fn resolve(&self, request_path: &str) -> ResourceResult<Option<Resource>> {
        let candidate = self.shared.resolver.candidate(request_path)?;
        let resource = Resource::at(&self.shared, candidate)?;
        debug!(
            path = request_path,
            found = resource.is_some(),
            "Resolved request path"
        );
        Ok(resource)
    }

    /// The root collection.
    pub fn root_collection(&self) -> ResourceResult<Collection> {
        match Resource::at(&self.shared, self.root().to_path_buf())? {
            Some(Resource::Collection(c)) => Ok(c),
            _ => Err(ResourceError::InvalidRoot(self.root().to_path_buf())),
        }
    }

    /// Identity `request_path` has, or would have once created.
    ///
    /// The nearest existing ancestor must lie inside the root.
    pub fn identity_for(&self, request_path: &str) -> ResourceResult<PathBuf> {
        let candidate = self.shared.resolver.candidate(request_path)?;
        for ancestor in candidate.ancestors() {
            if self.shared.resolver.contain(ancestor)?.is_some() {
                return Ok(candidate);
            }
            if ancestor == self.root() {
                break;
            }
        }
        Err(ResourceError::InvalidRoot(self.root().to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        self.shared.resolver.root()
    }

    pub fn lock_coordinator(&self) -> &Arc<dyn LockCoordinator> {
        &self.shared.locks
    }

    /// The installed policy; `None` in open-access mode.
    pub fn access_policy(&self) -> Option<&Arc<dyn AccessPolicy>> {
        self.shared.policy.as_ref()
    }

    /// Root-relative link for an absolute `path`.
    pub fn relative_href(&self, path: &Path, is_collection: bool) -> String {
        self.shared.resolver.relative_href(path, is_collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_kinds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.txt"), b"hello").unwrap();
        let factory = ResourceFactory::new(dir.path(), Credentials::new()).unwrap();

        assert!(factory.resolve("/").unwrap().unwrap().is_collection());
        assert!(factory.resolve("docs").unwrap().unwrap().is_collection());
        let item = factory.resolve("/docs/a.txt").unwrap().unwrap();
        assert!(item.as_item().is_some());
        assert_eq!(item.path(), factory.root().join("docs/a.txt"));
        assert!(factory.resolve("docs/missing.txt").unwrap().is_none());
        assert!(matches!(
            factory.resolve("../outside"),
            Err(ResourceError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_open_access_without_credentials() {
        let dir = TempDir::new().unwrap();
        let factory = ResourceFactory::new(dir.path(), Credentials::new()).unwrap();
        assert!(factory.access_policy().is_none());

        let secured =
            ResourceFactory::new(dir.path(), Credentials::from_entries(["u:p"])).unwrap();
        assert!(secured.access_policy().is_some());
    }

    #[test]
    fn test_identity_for_missing_path() {
        let dir = TempDir::new().unwrap();
        let factory = ResourceFactory::new(dir.path(), Credentials::new()).unwrap();
        let identity = factory.identity_for("/new/deeper.txt").unwrap();
        assert_eq!(identity, factory.root().join("new/deeper.txt"));
    }
}
