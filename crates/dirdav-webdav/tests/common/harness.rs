//! Test server harness for WebDAV integration tests.
//!
//! Provides a `TestServer` that serves a temporary directory, optionally
//! behind Basic authentication, along with HTTP convenience methods.

use bytes::Bytes;
use dirdav_core::{Credentials, ResourceFactory};
use dirdav_webdav::{ServerConfig, WebDavServer};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// User accepted by servers started with [`TestServer::with_credentials`].
pub const TEST_USER: &str = "alice";
/// Password for [`TEST_USER`].
pub const TEST_PASSWORD: &str = "test-password-12345";

/// Body of an exclusive write LOCK request.
const LOCK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner>dirdav-tests</D:owner>
</D:lockinfo>"#;

/// Test server with HTTP client and automatic cleanup.
pub struct TestServer {
    /// The running WebDAV server.
    server: WebDavServer,
    /// HTTP client for making requests.
    client: Client,
    /// Base URL for the server.
    pub base_url: String,
    /// Credentials sent with every request, if any.
    auth: Option<(String, String)>,
    /// Served directory (cleaned up on drop).
    temp_dir: TempDir,
}

impl TestServer {
    /// Start an open-access server over a fresh temporary directory.
    pub async fn with_temp_dir() -> Self {
        Self::start(Credentials::new(), None).await
    }

    /// Start a server requiring `TEST_USER`/`TEST_PASSWORD`.
    ///
    /// The harness's own requests carry those credentials.
    pub async fn with_credentials() -> Self {
        let credentials = Credentials::from_entries([format!("{TEST_USER}:{TEST_PASSWORD}")]);
        Self::start(
            credentials,
            Some((TEST_USER.to_string(), TEST_PASSWORD.to_string())),
        )
        .await
    }

    async fn start(credentials: Credentials, auth: Option<(String, String)>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let factory =
            ResourceFactory::new(temp_dir.path(), credentials).expect("Failed to create factory");

        let server = WebDavServer::start(factory, ServerConfig::default())
            .await
            .expect("Failed to start WebDAV server");
        let base_url = server.url();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let test_server = Self {
            server,
            client,
            base_url,
            auth,
            temp_dir,
        };
        test_server.wait_ready().await;
        test_server
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_ready(&self) {
        for _ in 0..50 {
            if self
                .client
                .request(Method::OPTIONS, &self.base_url)
                .send()
                .await
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready in time");
    }

    /// The served directory on disk.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Build a full URL from a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a request carrying the harness credentials.
    pub fn request(&self, method: &str, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(Method::from_bytes(method.as_bytes()).unwrap(), self.url(path));
        match &self.auth {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// Start a request with no credentials at all.
    pub fn anonymous(&self, method: &str, path: &str) -> RequestBuilder {
        self.client
            .request(Method::from_bytes(method.as_bytes()).unwrap(), self.url(path))
    }

    // ========== HTTP Convenience Methods ==========

    /// GET a file's contents.
    pub async fn get(&self, path: &str) -> Response {
        self.request("GET", path)
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a file's contents as bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, (StatusCode, String)> {
        let resp = self.get(path).await;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// PUT file contents.
    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.request("PUT", path)
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// PUT file contents and assert success.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self.put(path, body).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "PUT {} failed with status {}: {}",
            path,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// DELETE a file or directory.
    pub async fn delete(&self, path: &str) -> Response {
        self.request("DELETE", path)
            .send()
            .await
            .expect("DELETE request failed")
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> Response {
        self.request("MKCOL", path)
            .send()
            .await
            .expect("MKCOL request failed")
    }

    /// MKCOL and assert success.
    pub async fn mkcol_ok(&self, path: &str) {
        let resp = self.mkcol(path).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "MKCOL {} failed with status {}: {}",
            path,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// PROPFIND (list directory or get properties).
    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed")
    }

    /// PROPFIND and return body as string.
    pub async fn propfind_body(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self.propfind(path, depth).await;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        (status, body)
    }

    /// COPY a file or directory.
    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("COPY", from)
            .header("Destination", self.url(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("COPY request failed")
    }

    /// MOVE a file or directory.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("MOVE", from)
            .header("Destination", self.url(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("MOVE request failed")
    }

    /// LOCK a resource exclusively for ten minutes.
    pub async fn lock(&self, path: &str) -> Response {
        self.request("LOCK", path)
            .header("Timeout", "Second-600")
            .header("Content-Type", "application/xml")
            .body(LOCK_BODY)
            .send()
            .await
            .expect("LOCK request failed")
    }

    /// LOCK a resource and return its lock token, without angle brackets.
    pub async fn lock_ok(&self, path: &str) -> String {
        let resp = self.lock(path).await;
        let status = resp.status();
        assert!(status.is_success(), "LOCK {path} failed with status {status}");
        let header = resp
            .headers()
            .get("Lock-Token")
            .expect("LOCK response without Lock-Token")
            .to_str()
            .unwrap()
            .to_string();
        header
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string()
    }

    /// UNLOCK a resource.
    pub async fn unlock(&self, path: &str, token: &str) -> Response {
        self.request("UNLOCK", path)
            .header("Lock-Token", format!("<{token}>"))
            .send()
            .await
            .expect("UNLOCK request failed")
    }

    /// PUT file contents, submitting a lock token.
    pub async fn put_with_token(
        &self,
        path: &str,
        token: &str,
        body: impl Into<reqwest::Body>,
    ) -> Response {
        self.request("PUT", path)
            .header("If", format!("(<{token}>)"))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// Stop the server explicitly (otherwise happens on drop).
    pub async fn stop(self) {
        self.server.stop().await;
    }
}
