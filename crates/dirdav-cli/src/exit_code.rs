//! Process exit codes.
//!
//! Scripts can rely on these staying stable.

/// Server ran and shut down cleanly.
pub const SUCCESS: u8 = 0;

/// Anything not covered below.
pub const GENERAL_ERROR: u8 = 1;

/// Bad arguments or configuration file. Matches clap's own parse failures.
pub const USAGE: u8 = 2;

/// The folder to serve is missing or not a directory.
pub const INVALID_ROOT: u8 = 3;

/// The listen address could not be bound.
pub const BIND_FAILED: u8 = 4;
