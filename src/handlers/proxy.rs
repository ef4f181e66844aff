// Catch-all handler proxying to the configured origin

use axum::{
    extract::{Request, State},
    response::Response,
};
use std::sync::Arc;

use super::common::request_host;
use crate::{error::AppError, services::proxy_service, AppState};

pub async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Result<Response, AppError> {
    let host = request_host(request.headers(), request.uri());
    let config = state.settings.proxy_config(&host);
    let target = proxy_service::target_url(&state.origin, request.uri())?;

    proxy_service::handle_proxy_request(state.fetcher.as_ref(), request, target, &config).await
}
