pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod services;

use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use url::Url;

use config::ProxySettings;
use services::{
    fetch::{Fetch, ReqwestFetcher},
    url_rewrite::URL_REWRITE_SCRIPT_PATH,
};

// Application state, read-only once the server is running
pub struct AppState {
    pub settings: ProxySettings,
    pub origin: Url,
    pub fetcher: Arc<dyn Fetch>,
}

impl AppState {
    /// Validate `settings` and fetch from the origin with reqwest
    pub fn new(settings: ProxySettings) -> Result<Self> {
        let fetcher = ReqwestFetcher::new()?;
        Self::with_fetcher(settings, Arc::new(fetcher))
    }

    pub fn with_fetcher(settings: ProxySettings, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        settings.validate()?;
        let origin = settings.origin_url()?;
        Ok(Self {
            settings,
            origin,
            fetcher,
        })
    }
}

// Public function to create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    if state.settings.clientside_url_rewrite {
        router = router.route(URL_REWRITE_SCRIPT_PATH, get(handlers::url_rewrite::script));
    }

    router
        .fallback(handlers::proxy::proxy)
        .layer(RequestBodyLimitLayer::new(state.settings.max_request_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
