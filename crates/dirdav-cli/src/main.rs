#![deny(unsafe_code)]

mod config;
mod exit_code;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use dirdav_core::{Credentials, ResourceError, ResourceFactory};
use dirdav_webdav::{ServerConfig, WebDavServer};

use crate::config::{ConfigError, FileConfig, Overrides, Settings};

/// Serve a local directory over WebDAV
#[derive(Parser)]
#[command(name = "dirdav")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Serve the current directory on localhost:8080
    dirdav .

    # Serve on all interfaces with a login
    dirdav --bind 0.0.0.0 --port 9000 -c alice:secret /srv/share

    # Read settings from a file, overriding the port
    dirdav --config dirdav.toml --port 8081
")]
struct Cli {
    /// Directory to serve (or `root` from the config file)
    #[arg(value_name = "FOLDER")]
    folder: Option<PathBuf>,

    /// Port to listen on [default: 8080]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// Accepted login; repeat for more users. Without any, access is open
    #[arg(
        short,
        long,
        value_name = "USER:PASSWORD",
        env = "DIRDAV_CREDENTIALS",
        hide_env_values = true,
        value_delimiter = ','
    )]
    credentials: Vec<String>,

    /// TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            root: self.folder.clone(),
            port: self.port,
            bind: self.bind,
            credentials: self.credentials.clone(),
        }
    }
}

/// Failures while bringing the server up.
#[derive(Debug, Error)]
enum ServeError {
    #[error("Failed to listen on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let file = cli
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let settings = Settings::merge(cli.overrides(), file)?;

    let credentials = Credentials::from_entries(&settings.credentials);
    if credentials.len() < settings.credentials.len() {
        tracing::warn!(
            accepted = credentials.len(),
            given = settings.credentials.len(),
            "Some credential entries were ignored"
        );
    }
    let factory = ResourceFactory::new(&settings.root, credentials)
        .with_context(|| format!("Cannot serve {}", settings.root.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(factory, &settings, cli.quiet))
}

/// Run the server until Ctrl-C.
async fn serve(factory: ResourceFactory, settings: &Settings, quiet: bool) -> Result<()> {
    let open_access = factory.access_policy().is_none();
    let root = factory.root().to_path_buf();
    let config = ServerConfig::default()
        .with_port(settings.port)
        .with_bind_address(settings.bind);

    let server = WebDavServer::start(factory, config)
        .await
        .map_err(|source| ServeError::Bind {
            addr: SocketAddr::new(settings.bind, settings.port),
            source,
        })?;

    if !quiet {
        println!("Serving {} at {}", root.display(), server.url());
        if open_access {
            println!("No credentials configured: access is open to anyone who can connect");
        }
        println!("Press Ctrl-C to stop");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    server.stop().await;
    Ok(())
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_code::USAGE;
        }
        if let Some(ResourceError::InvalidRoot(_)) = cause.downcast_ref::<ResourceError>() {
            return exit_code::INVALID_ROOT;
        }
        if cause.downcast_ref::<ServeError>().is_some() {
            return exit_code::BIND_FAILED;
        }
    }
    exit_code::GENERAL_ERROR
}
