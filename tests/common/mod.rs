// Common test utilities shared across test files

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    response::Response,
    Router,
};
use edgegraft::{config::ProxySettings, error::AppError, services::fetch::Fetch, AppState};
use std::sync::{Arc, Mutex};

/// What the stub origin saw for one request
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub host: Option<String>,
    pub body: String,
}

/// Origin that answers every request with the same canned response
pub struct StubOrigin {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: String,
    fail: bool,
    pub seen: Mutex<Vec<SeenRequest>>,
}

#[allow(dead_code)]
impl StubOrigin {
    pub fn html(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: vec![("content-type", "text/html; charset=utf-8".to_string())],
            body: body.to_string(),
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::html(200, "")
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn without_content_type(mut self) -> Self {
        self.headers.retain(|(name, _)| *name != "content-type");
        self
    }

    pub fn last_request(&self) -> SeenRequest {
        self.seen.lock().unwrap().last().cloned().expect("origin was not called")
    }
}

#[async_trait]
impl Fetch for StubOrigin {
    async fn fetch(&self, request: Request) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        self.seen.lock().unwrap().push(SeenRequest {
            method: parts.method.clone(),
            url: parts.uri.to_string(),
            host: parts
                .headers
                .get("host")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
            body: String::from_utf8_lossy(&body).to_string(),
        });

        if self.fail {
            return Err(AppError::Upstream("connection refused".to_string()));
        }

        let mut response = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            response = response.header(*name, value.as_str());
        }
        Ok(response
            .header("content-length", self.body.len().to_string())
            .body(Body::from(self.body.clone()))
            .unwrap())
    }
}

/// Create a test router proxying to `origin` with `settings`
#[allow(dead_code)]
pub fn create_test_app(settings: ProxySettings, origin: Arc<StubOrigin>) -> Router {
    let state = AppState::with_fetcher(settings, origin).expect("valid test settings");
    edgegraft::create_router(Arc::new(state))
}

/// Settings parsed from YAML, proxying to https://origin.example
#[allow(dead_code)]
pub fn settings(yml: &str) -> ProxySettings {
    ProxySettings::from_yaml(&format!("origin: https://origin.example\n{}", yml)).unwrap()
}

#[allow(dead_code)]
pub async fn body_string(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
