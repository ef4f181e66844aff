// Request helpers shared across handlers

use axum::http::{header, HeaderMap, Uri};
use url::Url;

const FALLBACK_HOST: &str = "localhost";

/// Host the client addressed, port included.
///
/// Taken from the `Host` header, then the request URI. The value ends up in
/// injected markup, so anything that does not parse as a bare authority is
/// replaced by `localhost`.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
        .and_then(|host| normalized_authority(&host))
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

fn normalized_authority(host: &str) -> Option<String> {
    let url = Url::parse(&format!("http://{}/", host)).ok()?;
    if !url.username().is_empty() || url.password().is_some() || url.path() != "/" {
        return None;
    }
    if url.query().is_some() || url.fragment().is_some() {
        return None;
    }

    let name = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", name, port),
        None => name.to_string(),
    })
}
