//! Common test utilities for WebDAV integration tests.

pub mod assertions;
pub mod harness;

pub use assertions::*;
pub use harness::*;
