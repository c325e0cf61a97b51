//! Resource layer for serving a directory tree over WebDAV.
//!
//! A [`ResourceFactory`] maps request paths under a fixed root to typed
//! [`Resource`]s: a [`Collection`] for each directory and an [`Item`] for
//! each file. Every resolved path is checked to stay inside the root, both
//! lexically and after symlink resolution.
//!
//! Locking and access control are delegated. Items ask the factory's shared
//! [`LockCoordinator`] for exclusive locks; every resource forwards
//! authentication and authorization to an optional [`AccessPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use dirdav_core::{Credentials, Resource, ResourceFactory};
//!
//! let factory = ResourceFactory::new("/srv/share", Credentials::new())?;
//! if let Some(Resource::Collection(root)) = factory.resolve("/")? {
//!     for child in root.children()? {
//!         println!("{}", child.href());
//!     }
//! }
//! # Ok::<(), dirdav_core::ResourceError>(())
//! ```

pub mod access;
pub mod collection;
pub mod content_type;
pub mod error;
pub mod factory;
pub mod item;
pub mod lock;
pub mod path;
pub mod resource;

pub use access::{AccessPolicy, CredentialPolicy, Credentials, Method, Principal, RequestContext};
pub use collection::Collection;
pub use error::{ErrorKind, ResourceError, ResourceResult};
pub use factory::ResourceFactory;
pub use item::Item;
pub use lock::{LockCoordinator, LockInfo, LockRefusal, LockResult, LockTable, LockTimeout, LockToken};
pub use path::PathResolver;
pub use resource::{FormProcessor, Lockable, Replaceable, Resource};
