// Outbound fetch to the origin server

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use reqwest::redirect::Policy;

use crate::error::AppError;

/// Request headers that describe the inbound connection rather than the
/// request itself, plus the ones the origin fetch sets on its own.
const SKIPPED_REQUEST_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    // The body must reach the rewriter identity-encoded
    header::ACCEPT_ENCODING,
];

/// Connection-scoped response headers; the server sets its own framing
const HOP_BY_HOP_RESPONSE_HEADERS: [HeaderName; 4] = [
    header::CONNECTION,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Performs exactly one request against the origin
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, AppError>;
}

/// Origin fetch backed by a shared reqwest client.
///
/// Redirects are handed back to the client instead of being followed.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

pub fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in SKIPPED_REQUEST_HEADERS.iter() {
        forwarded.remove(name);
    }
    forwarded
}

#[async_trait]
impl Fetch for ReqwestFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let url = parts.uri.to_string();

        let mut outbound = self
            .client
            .request(parts.method, &url)
            .headers(forwarded_headers(&parts.headers));
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound.send().await?;

        tracing::debug!(%url, status = upstream.status().as_u16(), "Origin responded");

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            *headers = upstream.headers().clone();
            for name in HOP_BY_HOP_RESPONSE_HEADERS.iter() {
                headers.remove(name);
            }
        }
        // hyper keeps a non-canonical reason phrase here
        if let Some(extensions) = response.extensions_mut() {
            *extensions = upstream.extensions().clone();
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| AppError::Internal(format!("Failed to build origin response: {}", e)))
    }
}
