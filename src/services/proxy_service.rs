// Proxy service - forwards one request to the origin and rewrites the response

use axum::{
    body::Body,
    extract::Request,
    http::{header, response::Parts, HeaderMap, Method, StatusCode, Uri},
    response::Response,
};
use url::Url;

use crate::{
    domain::{csp, ProxyConfig},
    error::AppError,
    services::{fetch::Fetch, transform::RewritePlan},
};

const HTML_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// Origin URL joined with the inbound path and query
pub fn target_url(origin: &Url, uri: &Uri) -> Result<Url, AppError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let joined = format!("{}{}", origin.as_str().trim_end_matches('/'), path_and_query);
    Url::parse(&joined).map_err(|e| AppError::BadRequest(format!("Cannot proxy to '{}': {}", joined, e)))
}

/// Whether a response with these headers should go through the rewriter.
/// A missing content type is treated as HTML.
pub fn is_html(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(header::CONTENT_TYPE) else {
        return true;
    };
    let Ok(content_type) = content_type.to_str() else {
        return false;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    HTML_CONTENT_TYPES.iter().any(|html| essence.eq_ignore_ascii_case(html))
}

/// Whether the body arrives as plain bytes the rewriter can read.
/// Compressed bodies pass through untouched.
pub fn is_identity_encoded(headers: &HeaderMap) -> bool {
    headers.get_all(header::CONTENT_ENCODING).iter().all(|value| {
        value.to_str().is_ok_and(|codings| {
            codings
                .split(',')
                .map(str::trim)
                .all(|coding| coding.is_empty() || coding.eq_ignore_ascii_case("identity"))
        })
    })
}

fn has_body(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

/// Build the outbound response from the origin's parts.
///
/// Status, extensions and every header other than the already augmented
/// `Content-Security-Policy` pass through. A rewritten body has a new length,
/// so its `Content-Length` is dropped.
pub fn assemble_response(mut parts: Parts, body: Body, body_rewritten: bool) -> Response {
    if body_rewritten {
        parts.headers.remove(header::CONTENT_LENGTH);
    }
    Response::from_parts(parts, body)
}

/// Forward `request` to `target` and apply `config` to the response.
///
/// Fetch failures are returned as errors; failures while streaming the body
/// surface from the returned body.
pub async fn handle_proxy_request(
    fetcher: &dyn Fetch,
    request: Request,
    target: Url,
    config: &ProxyConfig,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    let (mut request_parts, request_body) = request.into_parts();
    request_parts.uri = target
        .as_str()
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid target URL '{}': {}", target, e)))?;

    tracing::debug!(%method, %path, %target, "Forwarding to origin");
    let origin_response = fetcher.fetch(Request::from_parts(request_parts, request_body)).await?;

    let (mut parts, body) = origin_response.into_parts();
    csp::augment_header_map(&mut parts.headers, &config.csp_additions());

    let plan = RewritePlan::for_response(config, &path, parts.status.as_u16());
    let rewrite = !plan.is_empty()
        && has_body(&method, parts.status)
        && is_html(&parts.headers)
        && is_identity_encoded(&parts.headers);

    let body = if rewrite {
        plan.transform_body(body)
    } else {
        tracing::debug!(%path, status = parts.status.as_u16(), "Passing body through unchanged");
        body
    };

    Ok(assemble_response(parts, body, rewrite))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_target_url_keeps_path_and_query() {
        let origin = Url::parse("https://origin.example").unwrap();
        let uri: Uri = "/p/42?ref=home".parse().unwrap();

        assert_eq!(target_url(&origin, &uri).unwrap().as_str(), "https://origin.example/p/42?ref=home");
    }

    #[test]
    fn test_target_url_with_origin_base_path() {
        let origin = Url::parse("https://origin.example/blog/").unwrap();
        let uri: Uri = "/p/1".parse().unwrap();

        assert_eq!(target_url(&origin, &uri).unwrap().as_str(), "https://origin.example/blog/p/1");
    }

    #[test]
    fn test_is_html() {
        let mut headers = HeaderMap::new();
        assert!(is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        assert!(is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Application/XHTML+XML"));
        assert!(is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        assert!(!is_html(&headers));
    }

    #[test]
    fn test_is_identity_encoded() {
        let mut headers = HeaderMap::new();
        assert!(is_identity_encoded(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("Identity"));
        assert!(is_identity_encoded(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_identity_encoded(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity, br"));
        assert!(!is_identity_encoded(&headers));
    }

    #[test]
    fn test_has_body() {
        assert!(has_body(&Method::GET, StatusCode::OK));
        assert!(has_body(&Method::GET, StatusCode::NOT_FOUND));
        assert!(!has_body(&Method::HEAD, StatusCode::OK));
        assert!(!has_body(&Method::GET, StatusCode::NO_CONTENT));
        assert!(!has_body(&Method::GET, StatusCode::NOT_MODIFIED));
    }

    fn teapot_parts() -> Parts {
        let origin = Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .header(header::CONTENT_LENGTH, "5")
            .header("x-origin", "yes")
            .body(())
            .unwrap();
        origin.into_parts().0
    }

    #[test]
    fn test_assemble_drops_length_only_when_rewritten() {
        let untouched = assemble_response(teapot_parts(), Body::from("hello"), false);
        assert_eq!(untouched.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(untouched.headers().get(header::CONTENT_LENGTH).unwrap(), "5");

        let rewritten = assemble_response(teapot_parts(), Body::from("hello!"), true);
        assert_eq!(rewritten.status(), StatusCode::IM_A_TEAPOT);
        assert!(rewritten.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(rewritten.headers().get("x-origin").unwrap(), "yes");
    }
}
