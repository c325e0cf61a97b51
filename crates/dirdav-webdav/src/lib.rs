//! WebDAV server for a local directory tree.
//!
//! This crate puts the `dirdav-core` resource layer behind an HTTP server
//! speaking WebDAV class 1 and 2.
//!
//! # How It Works
//!
//! 1. Every request passes an access gate: the target (or its nearest
//!    existing ancestor) authenticates Basic credentials and authorizes
//!    the request
//! 2. `GET`/`HEAD` on a collection return an HTML folder listing
//! 3. Everything else goes to dav-server, whose filesystem and lock system
//!    calls are translated to resource operations
//!
//! # Example
//!
//! ```ignore
//! use dirdav_core::{Credentials, ResourceFactory};
//! use dirdav_webdav::{ServerConfig, WebDavServer};
//!
//! let factory = ResourceFactory::new("/srv/share", Credentials::from_entries(["alice:secret"]))?;
//! let server = WebDavServer::start(factory, ServerConfig::default().with_port(8080)).await?;
//! println!("Serving at {}", server.url());
//! ```
//!
//! # Security
//!
//! By default, the server binds to localhost (127.0.0.1) only. Without
//! credentials every request is allowed.

mod auth;
mod dir_entry;
mod error;
mod file;
mod filesystem;
mod locks;
mod metadata;
mod server;

// Public exports
pub use auth::{basic_credentials, challenge};
pub use dir_entry::ResourceDirEntry;
pub use error::WebDavError;
pub use file::ResourceFile;
pub use filesystem::DirDavFs;
pub use locks::ResourceLocks;
pub use metadata::ResourceMetaData;
pub use server::{ServerConfig, WebDavServer};
