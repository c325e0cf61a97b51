//! Custom assertions for WebDAV integration tests.

use crate::common::TestServer;
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use std::collections::HashSet;

/// Assert that a file exists and has the expected content.
pub async fn assert_file_content(server: &TestServer, path: &str, expected: &[u8]) {
    match server.get_bytes(path).await {
        Ok(actual) => {
            assert_eq!(
                actual.as_ref(),
                expected,
                "File content mismatch at {}: expected {} bytes, got {} bytes",
                path,
                expected.len(),
                actual.len()
            );
        }
        Err((status, body)) => {
            panic!("Failed to read file {path}: status={status}, body={body}");
        }
    }
}

/// Assert that a path returns 404 Not Found.
pub async fn assert_not_found(server: &TestServer, path: &str) {
    let resp = server.get(path).await;
    assert_eq!(
        resp.status(),
        StatusCode::NOT_FOUND,
        "Expected 404 for {}, got {}",
        path,
        resp.status()
    );
}

/// Assert that a response has a specific status code.
pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "{context}: expected status {expected}, got {actual}"
    );
}

/// Assert that a directory contains exactly the expected entries.
///
/// Parses a PROPFIND depth=1 response and checks the entry hrefs, given
/// as absolute paths.
pub async fn assert_dir_entries(server: &TestServer, path: &str, expected: &[&str]) {
    let (status, body) = server.propfind_body(path, "1").await;
    assert_eq!(
        status,
        StatusCode::MULTI_STATUS,
        "PROPFIND {path} failed: {body}"
    );

    let mut actual: HashSet<String> = extract_hrefs(&body)
        .into_iter()
        .map(|href| href.trim_end_matches('/').to_string())
        .collect();
    actual.remove(path.trim_end_matches('/'));
    actual.remove("");

    let expected: HashSet<String> = expected
        .iter()
        .map(|s| s.trim_end_matches('/').to_string())
        .collect();
    assert_eq!(actual, expected, "Directory {path} entries mismatch");
}

/// Extract decoded href values from a PROPFIND XML response.
///
/// Handles any namespace prefix; good enough for the server's own output.
fn extract_hrefs(xml: &str) -> Vec<String> {
    let mut hrefs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("href>") {
        let after = &rest[start + "href>".len()..];
        let Some(end) = after.find('<') else {
            break;
        };
        let value = after[..end].trim();
        // Closing tags also end in "href>" and capture nothing.
        if !value.is_empty() {
            let path = value
                .find("://")
                .and_then(|scheme| value[scheme + 3..].find('/').map(|p| &value[scheme + 3 + p..]))
                .unwrap_or(value);
            hrefs.push(percent_decode_str(path).decode_utf8_lossy().into_owned());
        }
        rest = &after[end..];
    }
    hrefs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hrefs() {
        let xml = "<D:multistatus><D:response><D:href>/docs/</D:href></D:response>\
                   <D:response><D:href>/docs/a%20b.txt</D:href></D:response></D:multistatus>";
        assert_eq!(extract_hrefs(xml), vec!["/docs/", "/docs/a b.txt"]);
    }
}
