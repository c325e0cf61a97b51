//! Optional TOML configuration file and its merge with command-line flags.
//!
//! ```toml
//! root = "/srv/share"
//! port = 8080
//! bind = "0.0.0.0"
//! credentials = ["alice:secret"]
//! ```
//!
//! Flags given on the command line win over file values.

use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Configuration problems. All of them are usage errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("No folder to serve; pass FOLDER or set `root` in the config file")]
    MissingRoot,
}

/// Contents of a config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    #[serde(default)]
    pub credentials: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values taken from the command line. `None`/empty means "not given".
#[derive(Debug, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub credentials: Vec<String>,
}

/// Final server settings.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub port: u16,
    pub bind: IpAddr,
    pub credentials: Vec<String>,
}

impl Settings {
    /// Merge flags over an optional file config, then apply defaults.
    ///
    /// Credentials are taken as a whole from the command line when any are
    /// given there, otherwise from the file.
    pub fn merge(cli: Overrides, file: Option<FileConfig>) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let root = cli.root.or(file.root).ok_or(ConfigError::MissingRoot)?;
        let credentials = if cli.credentials.is_empty() {
            file.credentials
        } else {
            cli.credentials
        };
        Ok(Self {
            root,
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            bind: cli.bind.or(file.bind).unwrap_or(DEFAULT_BIND),
            credentials,
        })
    }
}
