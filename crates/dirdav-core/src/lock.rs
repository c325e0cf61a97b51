//! Exclusive lock coordination keyed by resource identity.
//!
//! Items never hold lock state themselves. They ask a shared
//! [`LockCoordinator`] using their identity (absolute path). The coordinator
//! guarantees at most one active lock per identity.
//!
//! [`LockTable`] is the in-memory coordinator used by the server. It is
//! backed by `DashMap`, whose entry API holds the shard lock while a grant
//! is decided, so exactly one of several racing grants on the same identity
//! wins.
//!
//! # Expiry
//!
//! Expiry is lazy. An expired lock behaves as absent and is purged the next
//! time its identity is touched.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

/// How long a lock stays valid without a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    /// Never expires on its own.
    Infinite,
    /// Expires this many seconds after being issued or refreshed.
    Seconds(u64),
}

impl LockTimeout {
    /// Convert from the `Option<Duration>` form used by protocol engines.
    pub fn from_duration(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(d) => LockTimeout::Seconds(d.as_secs()),
            None => LockTimeout::Infinite,
        }
    }

    /// The timeout as a duration, `None` for infinite.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            LockTimeout::Infinite => None,
            LockTimeout::Seconds(s) => Some(Duration::from_secs(s)),
        }
    }
}

/// Requester-supplied lock metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockInfo {
    /// Free-form owner description (the `owner` element of a LOCK body).
    pub owner: Option<String>,
    /// Authenticated principal that requested the lock.
    pub principal: Option<String>,
    /// Depth-infinity lock.
    pub deep: bool,
}

impl LockInfo {
    /// Empty lock info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner description.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the requesting principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Mark the lock as depth-infinity.
    #[must_use]
    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

/// An active lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Opaque token string handed to the client.
    pub token: String,
    /// Identity of the locked resource.
    pub resource: PathBuf,
    /// Metadata supplied by the requester.
    pub info: LockInfo,
    /// Timeout requested at grant or last refresh.
    pub timeout: LockTimeout,
    /// When the lock was granted or last refreshed.
    pub issued_at: SystemTime,
}

impl LockToken {
    fn issue(resource: &Path, info: &LockInfo, timeout: LockTimeout, now: SystemTime) -> Self {
        Self {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            resource: resource.to_path_buf(),
            info: info.clone(),
            timeout,
            issued_at: now,
        }
    }

    /// Absolute expiry time, `None` for infinite locks.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.timeout
            .as_duration()
            .and_then(|d| self.issued_at.checked_add(d))
    }

    /// Whether the lock has expired at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

/// Why a coordinator refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockRefusal {
    /// Another lock is active on the identity.
    #[error("resource already locked with token {}", .0.token)]
    Locked(Box<LockToken>),
    /// The presented token does not match an active lock.
    #[error("no active lock with token {0}")]
    UnknownToken(String),
}

/// Outcome of a grant or refresh.
pub type LockResult = Result<LockToken, LockRefusal>;

/// Grants, refreshes and releases exclusive locks by resource identity.
///
/// Implementations must be safe to share between request threads and must
/// serialize conflicting grants on the same identity.
pub trait LockCoordinator: fmt::Debug + Send + Sync {
    /// Request a new exclusive lock on `resource`.
    fn grant(&self, timeout: LockTimeout, info: &LockInfo, resource: &Path) -> LockResult;

    /// Extend the lock identified by `token` on `resource`.
    fn refresh(&self, token: &str, timeout: LockTimeout, resource: &Path) -> LockResult;

    /// Release the lock identified by `token` on `resource`.
    fn release(&self, token: &str, resource: &Path) -> Result<(), LockRefusal>;

    /// The active lock on `resource`, if any.
    fn current_token(&self, resource: &Path) -> Option<LockToken>;

    /// Active locks on `resource` and everything below it.
    fn tokens_within(&self, resource: &Path) -> Vec<LockToken>;

    /// Drop every lock on `resource` and below it.
    fn forget(&self, resource: &Path);
}

/// In-memory [`LockCoordinator`].
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<PathBuf, LockToken>,
}

impl LockTable {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn purge_expired(&self, resource: &Path, now: SystemTime) {
        if self
            .locks
            .remove_if(resource, |_, held| held.is_expired_at(now))
            .is_some()
        {
            trace!(resource = %resource.display(), "Purged expired lock");
        }
    }
}

impl LockCoordinator for LockTable {
    fn grant(&self, timeout: LockTimeout, info: &LockInfo, resource: &Path) -> LockResult {
        let now = SystemTime::now();
        match self.locks.entry(resource.to_path_buf()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired_at(now) {
                    let token = LockToken::issue(resource, info, timeout, now);
                    entry.insert(token.clone());
                    debug!(resource = %resource.display(), token = %token.token, "Replaced expired lock");
                    Ok(token)
                } else {
                    debug!(
                        resource = %resource.display(),
                        held = %entry.get().token,
                        "Lock refused, already held"
                    );
                    Err(LockRefusal::Locked(Box::new(entry.get().clone())))
                }
            }
            Entry::Vacant(entry) => {
                let token = LockToken::issue(resource, info, timeout, now);
                entry.insert(token.clone());
                debug!(resource = %resource.display(), token = %token.token, "Lock granted");
                Ok(token)
            }
        }
    }

    fn refresh(&self, token: &str, timeout: LockTimeout, resource: &Path) -> LockResult {
        let now = SystemTime::now();
        if let Some(mut held) = self.locks.get_mut(resource)
            && held.token == token
            && !held.is_expired_at(now)
        {
            held.timeout = timeout;
            held.issued_at = now;
            debug!(resource = %resource.display(), token = %token, "Lock refreshed");
            return Ok(held.clone());
        }
        self.purge_expired(resource, now);
        Err(LockRefusal::UnknownToken(token.to_string()))
    }

    fn release(&self, token: &str, resource: &Path) -> Result<(), LockRefusal> {
        match self.locks.remove_if(resource, |_, held| held.token == token) {
            Some(_) => {
                debug!(resource = %resource.display(), token = %token, "Lock released");
                Ok(())
            }
            None => Err(LockRefusal::UnknownToken(token.to_string())),
        }
    }

    fn current_token(&self, resource: &Path) -> Option<LockToken> {
        let now = SystemTime::now();
        let held = self.locks.get(resource).map(|held| held.value().clone())?;
        if held.is_expired_at(now) {
            self.purge_expired(resource, now);
            return None;
        }
        Some(held)
    }

    fn tokens_within(&self, resource: &Path) -> Vec<LockToken> {
        let now = SystemTime::now();
        self.locks
            .iter()
            .filter(|entry| entry.key().starts_with(resource) && !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn forget(&self, resource: &Path) {
        let before = self.locks.len();
        self.locks.retain(|path, _| !path.starts_with(resource));
        let dropped = before.saturating_sub(self.locks.len());
        if dropped > 0 {
            debug!(resource = %resource.display(), dropped, "Forgot locks");
        }
    }
}
