//! Authentication and authorization delegation.
//!
//! Resources never decide access on their own. They forward to an optional
//! [`AccessPolicy`]; with no policy installed the server runs in open-access
//! mode where every user is accepted and every request authorized.

use crate::resource::Resource;
use std::collections::HashMap;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    /// Wrap a user name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The user name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request method as far as access decisions care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Options,
    Propfind,
    Put,
    Delete,
    Mkcol,
    Copy,
    Move,
    Lock,
    Unlock,
    Proppatch,
    Post,
    Other(String),
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PROPFIND" => Method::Propfind,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "MKCOL" => Method::Mkcol,
            "COPY" => Method::Copy,
            "MOVE" => Method::Move,
            "LOCK" => Method::Lock,
            "UNLOCK" => Method::Unlock,
            "PROPPATCH" => Method::Proppatch,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

/// What a policy sees about the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Raw `Accept` header value, if any.
    pub accepts: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<Method>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            accepts: None,
        }
    }

    #[must_use]
    pub fn with_accepts(mut self, accepts: impl Into<String>) -> Self {
        self.accepts = Some(accepts.into());
        self
    }
}

/// Pluggable authentication and authorization.
pub trait AccessPolicy: fmt::Debug + Send + Sync {
    /// Verify a user/password pair.
    fn authenticate(&self, user: &str, password: &str) -> Option<Principal>;

    /// Decide whether `principal` may perform `request` on `resource`.
    fn authorize(
        &self,
        request: &RequestContext,
        principal: Option<&Principal>,
        resource: &Resource,
    ) -> bool;
}

/// Username to password map.
#[derive(Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users: Vec<&String> = self.users.keys().collect();
        users.sort();
        f.debug_struct("Credentials")
            .field("users", &users)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `USER:PASSWORD`.
    ///
    /// Exactly one `:` is allowed and both sides must be non-empty.
    pub fn parse_entry(entry: &str) -> Option<(String, String)> {
        let (user, password) = entry.split_once(':')?;
        if user.is_empty() || password.is_empty() || password.contains(':') {
            return None;
        }
        Some((user.to_string(), password.to_string()))
    }

    /// Build from `USER:PASSWORD` entries, skipping malformed ones.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut credentials = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            match Self::parse_entry(entry) {
                Some((user, password)) => credentials.insert(user, password),
                None => {
                    // Never log the entry itself, it may hold a password.
                    warn!(
                        prefix = entry.split(':').next().unwrap_or_default(),
                        "Skipping malformed credential entry"
                    );
                }
            }
        }
        credentials
    }

    pub fn insert(&mut self, user: impl Into<String>, password: impl Into<String>) {
        self.users.insert(user.into(), password.into());
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a password without leaking timing about where it differs.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.users
            .get(user)
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(password.as_bytes())))
    }
}

/// Policy backed by a fixed [`Credentials`] map.
///
/// Any authenticated principal may do anything; anonymous requests are
/// rejected.
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    credentials: Credentials,
}

impl CredentialPolicy {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl AccessPolicy for CredentialPolicy {
    fn authenticate(&self, user: &str, password: &str) -> Option<Principal> {
        if self.credentials.verify(user, password) {
            Some(Principal::new(user))
        } else {
            debug!(user, "Authentication failed");
            None
        }
    }

    fn authorize(
        &self,
        request: &RequestContext,
        principal: Option<&Principal>,
        _resource: &Resource,
    ) -> bool {
        let allowed = principal.is_some();
        if !allowed {
            debug!(method = ?request.method, path = %request.path, "Anonymous request denied");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            Credentials::parse_entry("alice:secret"),
            Some(("alice".to_string(), "secret".to_string()))
        );
        assert_eq!(Credentials::parse_entry("alice"), None);
        assert_eq!(Credentials::parse_entry(":secret"), None);
        assert_eq!(Credentials::parse_entry("alice:"), None);
        assert_eq!(Credentials::parse_entry("a:b:c"), None);
    }

    #[test]
    fn test_from_entries_skips_malformed() {
        let creds = Credentials::from_entries(["alice:one", "broken", "bob:two", "x:y:z"]);
        assert_eq!(creds.len(), 2);
        assert!(creds.verify("alice", "one"));
        assert!(creds.verify("bob", "two"));
        assert!(!creds.verify("bob", "one"));
        assert!(!creds.verify("carol", "one"));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let creds = Credentials::from_entries(["alice:hunter2"]);
        let text = format!("{creds:?}");
        assert!(text.contains("alice"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_policy_authenticate() {
        let policy = CredentialPolicy::new(Credentials::from_entries(["alice:pw"]));
        assert_eq!(policy.authenticate("alice", "pw"), Some(Principal::new("alice")));
        assert_eq!(policy.authenticate("alice", "nope"), None);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::from("propfind"), Method::Propfind);
        assert_eq!(Method::from("MKCOL"), Method::Mkcol);
        assert_eq!(Method::from("REPORT"), Method::Other("REPORT".to_string()));
    }
}
