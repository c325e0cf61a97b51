//! dav-server lock system backed by the resource layer's coordinator.
//!
//! LOCK, UNLOCK and refresh on an existing item go through the item's
//! [`Lockable`] capability. Paths with nothing behind them are locked
//! directly in the coordinator under the identity they will have once
//! created. Collections never hold locks; a LOCK on one is refused.

use crate::filesystem::DirDavFs;
use dav_server::davpath::DavPath;
use dav_server::ls::{DavLock, DavLockSystem, LsFuture};
use dirdav_core::{
    LockInfo, LockTimeout, LockToken, Lockable, Resource, ResourceError, ResourceFactory,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use xmltree::{Element, XMLNode};

/// Lock system shared by every request the handler serves.
#[derive(Debug, Clone)]
pub struct ResourceLocks {
    factory: ResourceFactory,
}

impl ResourceLocks {
    pub fn new(factory: ResourceFactory) -> Self {
        Self { factory }
    }

    fn identity(&self, path: &DavPath) -> Option<PathBuf> {
        let request_path = DirDavFs::request_path(path);
        match self.factory.identity_for(&request_path) {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!(path = %request_path, error = %e, "No lock identity for path");
                None
            }
        }
    }

    fn item(&self, path: &DavPath) -> Result<Option<Resource>, ResourceError> {
        self.factory.resolve(&DirDavFs::request_path(path))
    }

    fn lock_blocking(
        &self,
        path: &DavPath,
        timeout: LockTimeout,
        info: &LockInfo,
        shared: bool,
    ) -> Result<DavLock, DavLock> {
        let refused = || refusal(path, info, timeout, shared);
        let result = match self.item(path) {
            Ok(Some(Resource::Item(item))) => item.lock(timeout, info).map_err(|e| match e {
                ResourceError::Locked { .. } => item
                    .current_lock()
                    .map_or_else(refused, |held| to_dav_lock(path, &held)),
                other => {
                    warn!(error = %other, "Lock request failed");
                    refused()
                }
            }),
            Ok(Some(Resource::Collection(_))) => {
                debug!(path = %path.as_url_string(), "Collections cannot be locked");
                Err(refused())
            }
            Ok(None) => {
                let identity = self.identity(path).ok_or_else(refused)?;
                self.factory
                    .lock_coordinator()
                    .grant(timeout, info, &identity)
                    .map_err(|_| {
                        self.factory
                            .lock_coordinator()
                            .current_token(&identity)
                            .map_or_else(refused, |held| to_dav_lock(path, &held))
                    })
            }
            Err(e) => {
                debug!(error = %e, "Cannot resolve lock target");
                Err(refused())
            }
        };
        result.map(|token| to_dav_lock(path, &token))
    }

    /// First lock on `path` (or below it when `deep`) that the request may
    /// not pass.
    fn check_blocking(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        ignore_principal: bool,
        deep: bool,
        submitted: &[String],
    ) -> Result<(), DavLock> {
        let Some(identity) = self.identity(path) else {
            return Ok(());
        };
        let coordinator = self.factory.lock_coordinator();
        let held = if deep {
            coordinator.tokens_within(&identity)
        } else {
            coordinator.current_token(&identity).into_iter().collect()
        };
        let result = held
            .iter()
            .find(|lock| {
                let was_submitted = submitted.iter().any(|t| *t == lock.token);
                let same_owner = ignore_principal || lock.info.principal.as_deref() == principal;
                !(was_submitted && same_owner)
            })
            .map_or(Ok(()), |blocking| Err(to_dav_lock(path, blocking)));
        if let Err(lock) = &result {
            debug!(path = %path.as_url_string(), token = %lock.token, "Lock check failed");
        }
        result
    }
}

/// Placeholder lock reported when a request is refused without a holder.
fn refusal(path: &DavPath, info: &LockInfo, timeout: LockTimeout, shared: bool) -> DavLock {
    DavLock {
        token: String::new(),
        path: path.clone(),
        principal: info.principal.clone(),
        owner: info.owner.as_deref().map(owner_element),
        timeout_at: None,
        timeout: timeout.as_duration(),
        shared,
        deep: info.deep,
    }
}

fn owner_element(owner: &str) -> Element {
    let mut element = Element::new("owner");
    element.children.push(XMLNode::Text(owner.to_string()));
    element
}

fn to_dav_lock(path: &DavPath, token: &LockToken) -> DavLock {
    DavLock {
        token: token.token.clone(),
        path: path.clone(),
        principal: token.info.principal.clone(),
        owner: token.info.owner.as_deref().map(owner_element),
        timeout_at: token.expires_at(),
        timeout: token.timeout.as_duration(),
        shared: false,
        deep: token.info.deep,
    }
}

impl DavLockSystem for ResourceLocks {
    fn lock(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: Option<&Element>,
        timeout: Option<Duration>,
        shared: bool,
        deep: bool,
    ) -> LsFuture<'_, Result<DavLock, DavLock>> {
        let mut info = LockInfo::new().with_deep(deep);
        info.principal = principal.map(str::to_string);
        info.owner = owner
            .and_then(|o| o.get_text())
            .map(|text| text.trim().to_string());
        let timeout = LockTimeout::from_duration(timeout);
        let path = path.clone();
        let this = self.clone();

        Box::pin(async move {
            let refused = refusal(&path, &info, timeout, shared);
            tokio::task::spawn_blocking(move || this.lock_blocking(&path, timeout, &info, shared))
                .await
                .unwrap_or(Err(refused))
        })
    }

    fn unlock(&self, path: &DavPath, token: &str) -> LsFuture<'_, Result<(), ()>> {
        let path = path.clone();
        let token = token.to_string();
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || match this.item(&path) {
                Ok(Some(Resource::Item(item))) => item.unlock(&token).map_err(|_| ()),
                _ => {
                    let identity = this.identity(&path).ok_or(())?;
                    this.factory
                        .lock_coordinator()
                        .release(&token, &identity)
                        .map_err(|_| ())
                }
            })
            .await
            .unwrap_or(Err(()))
        })
    }

    fn refresh(
        &self,
        path: &DavPath,
        token: &str,
        timeout: Option<Duration>,
    ) -> LsFuture<'_, Result<DavLock, ()>> {
        let path = path.clone();
        let token = token.to_string();
        let timeout = LockTimeout::from_duration(timeout);
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let refreshed = match this.item(&path) {
                    Ok(Some(Resource::Item(item))) => {
                        item.refresh_lock(&token, timeout).map_err(|_| ())?
                    }
                    _ => {
                        let identity = this.identity(&path).ok_or(())?;
                        this.factory
                            .lock_coordinator()
                            .refresh(&token, timeout, &identity)
                            .map_err(|_| ())?
                    }
                };
                Ok(to_dav_lock(&path, &refreshed))
            })
            .await
            .unwrap_or(Err(()))
        })
    }

    fn check(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        ignore_principal: bool,
        deep: bool,
        submitted_tokens: Vec<&str>,
    ) -> LsFuture<'_, Result<(), DavLock>> {
        let path = path.clone();
        let principal = principal.map(str::to_string);
        let submitted: Vec<String> = submitted_tokens.into_iter().map(str::to_string).collect();
        let this = self.clone();
        Box::pin(async move {
            let info = LockInfo::new().with_deep(deep);
            let refused = refusal(&path, &info, LockTimeout::Infinite, false);
            tokio::task::spawn_blocking(move || {
                this.check_blocking(&path, principal.as_deref(), ignore_principal, deep, &submitted)
            })
            .await
            .unwrap_or(Err(refused))
        })
    }

    fn discover(&self, path: &DavPath) -> LsFuture<'_, Vec<DavLock>> {
        let path = path.clone();
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                this.identity(&path)
                    .and_then(|identity| this.factory.lock_coordinator().current_token(&identity))
                    .map(|held| vec![to_dav_lock(&path, &held)])
                    .unwrap_or_default()
            })
            .await
            .unwrap_or_default()
        })
    }

    fn delete(&self, path: &DavPath) -> LsFuture<'_, Result<(), ()>> {
        let path = path.clone();
        let this = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                if let Some(identity) = this.identity(&path) {
                    this.factory.lock_coordinator().forget(&identity);
                }
            })
            .await
            .map_err(|e| warn!(error = %e, "Lock cleanup worker failed"))
        })
    }
}
