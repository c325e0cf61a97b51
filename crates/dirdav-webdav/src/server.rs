//! HTTP server lifecycle management for WebDAV.
//!
//! This module provides the HTTP server that gates requests through the
//! resource layer's access policy, answers `GET`/`HEAD` on collections with
//! an HTML listing and hands everything else to dav-server.

use crate::auth;
use crate::filesystem::DirDavFs;
use crate::locks::ResourceLocks;
use dav_server::body::Body;
use dav_server::{DavConfig, DavHandler};
use dirdav_core::{Method, Principal, RequestContext, Resource, ResourceFactory};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Configuration for the WebDAV server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 = auto-assign).
    pub port: u16,
    /// Bind address.
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }
}

/// A running WebDAV server instance.
pub struct WebDavServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Everything a connection task needs.
struct ServerState {
    factory: ResourceFactory,
    handler: DavHandler,
}

/// Outcome of the access gate for one request.
#[derive(Debug)]
enum Decision {
    /// Pass to dav-server, optionally on behalf of a principal.
    Dav(Option<Principal>),
    /// Answer with this HTML listing.
    Listing(String),
    /// Ask for credentials in this realm.
    Challenge(String),
    /// Answer with a bare status.
    Status(StatusCode),
}

impl WebDavServer {
    /// Start a new WebDAV server over `factory`.
    pub async fn start(factory: ResourceFactory, config: ServerConfig) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        info!(
            addr = %actual_addr,
            root = %factory.root().display(),
            "Starting WebDAV server"
        );

        let handler = DavHandler::builder()
            .filesystem(Box::new(DirDavFs::new(factory.clone())))
            .locksystem(Box::new(ResourceLocks::new(factory.clone())))
            .build_handler();

        let state = Arc::new(ServerState { factory, handler });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = run_server(listener, state) => {
                    debug!("Server loop ended");
                }
                _ = shutdown_rx => {
                    info!("Received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the URL for this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the server.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("WebDAV server stopped");
    }

    /// Stop the server synchronously (for use in Drop).
    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WebDavServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Run the server accept loop.
async fn run_server(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(serve(state, req).await) }
                    });

                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Handle one request: gate, listing or dav-server.
async fn serve(state: Arc<ServerState>, req: Request<Incoming>) -> Response<Body> {
    let path = percent_decode_str(req.uri().path())
        .decode_utf8_lossy()
        .into_owned();
    let mut request = RequestContext::new(req.method().as_str(), path);
    if let Some(accepts) = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
    {
        request = request.with_accepts(accepts);
    }
    let credentials = auth::basic_credentials(req.headers());
    let is_head = request.method == Method::Head;

    let factory = state.factory.clone();
    let decision = match tokio::task::spawn_blocking(move || decide(&factory, &request, credentials)).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(error = %e, "Access check failed");
            Decision::Status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    match decision {
        Decision::Dav(principal) => {
            let mut config = DavConfig::new();
            if let Some(principal) = principal {
                config = config.principal(principal.name());
            }
            state.handler.handle_with(config, req).await
        }
        Decision::Listing(page) => listing_response(page, is_head),
        Decision::Challenge(realm) => {
            let mut resp = status_response(StatusCode::UNAUTHORIZED);
            resp.headers_mut()
                .insert(header::WWW_AUTHENTICATE, auth::challenge(&realm));
            resp
        }
        Decision::Status(status) => status_response(status),
    }
}

/// Decide what to do with a request. Runs on the blocking pool.
fn decide(
    factory: &ResourceFactory,
    request: &RequestContext,
    credentials: Option<(String, String)>,
) -> Decision {
    let Some((target, exact)) = nearest_existing(factory, &request.path) else {
        return Decision::Status(StatusCode::FORBIDDEN);
    };

    let principal = credentials
        .as_ref()
        .and_then(|(user, password)| target.authenticate(user, password));
    if factory.access_policy().is_some() && principal.is_none() {
        debug!(method = ?request.method, path = %request.path, "Credentials required");
        return Decision::Challenge(target.realm());
    }
    if !target.authorize(request, principal.as_ref()) {
        return Decision::Status(StatusCode::FORBIDDEN);
    }

    if exact
        && matches!(request.method, Method::Get | Method::Head)
        && let Resource::Collection(collection) = &target
    {
        return match collection.render_listing() {
            Ok(page) => Decision::Listing(page),
            Err(e) => {
                error!(path = %request.path, error = %e, "Listing failed");
                Decision::Status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
    }
    Decision::Dav(principal)
}

/// The resource at `path`, or its nearest existing ancestor.
///
/// The flag is true when the resource is the target itself. Paths that
/// escape the root give `None`.
fn nearest_existing(factory: &ResourceFactory, path: &str) -> Option<(Resource, bool)> {
    let mut current = path.trim_end_matches('/').to_string();
    let mut exact = true;
    loop {
        match factory.resolve(&current) {
            Ok(Some(resource)) => return Some((resource, exact)),
            Ok(None) => {}
            Err(e) => {
                debug!(path, error = %e, "Request path rejected");
                return None;
            }
        }
        match current.rfind('/') {
            Some(idx) => current.truncate(idx),
            None if current.is_empty() => return None,
            None => current.clear(),
        }
        exact = false;
    }
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

fn listing_response(page: String, is_head: bool) -> Response<Body> {
    let len = page.len();
    let mut resp = if is_head {
        Response::new(Body::empty())
    } else {
        Response::new(Body::from(page))
    };
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirdav_core::Credentials;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 0);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));

        let config = config.with_port(8080);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_nearest_existing_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let factory = ResourceFactory::new(dir.path(), Credentials::new()).unwrap();

        let (found, exact) = nearest_existing(&factory, "/docs/").unwrap();
        assert!(exact);
        assert_eq!(found.name(), "docs");

        let (found, exact) = nearest_existing(&factory, "/docs/new/file.txt").unwrap();
        assert!(!exact);
        assert_eq!(found.path(), factory.root().join("docs"));

        let (found, _) = nearest_existing(&factory, "/missing").unwrap();
        assert_eq!(found.path(), factory.root());

        assert!(nearest_existing(&factory, "/../etc").is_none());
    }

    #[test]
    fn test_decide_in_credential_mode() {
        let dir = TempDir::new().unwrap();
        let factory =
            ResourceFactory::new(dir.path(), Credentials::from_entries(["alice:pw"])).unwrap();
        let request = RequestContext::new("PROPFIND", "/");

        assert!(matches!(
            decide(&factory, &request, None),
            Decision::Challenge(realm) if realm == factory.root().display().to_string()
        ));
        assert!(matches!(
            decide(&factory, &request, Some(("alice".into(), "bad".into()))),
            Decision::Challenge(_)
        ));
        assert!(matches!(
            decide(&factory, &request, Some(("alice".into(), "pw".into()))),
            Decision::Dav(Some(_))
        ));
    }

    #[test]
    fn test_decide_lists_collections_on_get() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let factory = ResourceFactory::new(dir.path(), Credentials::new()).unwrap();

        match decide(&factory, &RequestContext::new("GET", "/"), None) {
            Decision::Listing(page) => assert!(page.contains("href=\"/a.txt\"")),
            other => panic!("expected listing, got {other:?}"),
        }
        assert!(matches!(
            decide(&factory, &RequestContext::new("GET", "/a.txt"), None),
            Decision::Dav(None)
        ));
    }
}
