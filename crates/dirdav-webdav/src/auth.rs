//! HTTP Basic authentication helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hyper::header::{self, HeaderMap, HeaderValue};
use tracing::debug;

/// Extract `(user, password)` from a Basic `Authorization` header.
///
/// Anything malformed counts as no credentials.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let (scheme, payload) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.trim().split_once(' '))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        debug!(scheme, "Unsupported authentication scheme");
        return None;
    }

    let decoded = STANDARD
        .decode(payload.trim())
        .ok()
        .and_then(|token| String::from_utf8(token).ok());
    let Some(decoded) = decoded else {
        debug!("Failed to decode Basic credentials");
        return None;
    };
    decoded
        .split_once(':')
        .map(|(user, password)| (user.to_string(), password.to_string()))
}

/// `WWW-Authenticate` value asking for Basic credentials in `realm`.
pub fn challenge(realm: &str) -> HeaderValue {
    let escaped = realm.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("Basic realm=\"{escaped}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"dirdav\""))
}
