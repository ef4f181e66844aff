// Serves the client-side URL rewrite script

use axum::{
    extract::State,
    http::{header, HeaderMap, Uri},
    response::IntoResponse,
};
use std::sync::Arc;

use super::common::request_host;
use crate::{error::AppError, services::url_rewrite, AppState};

pub async fn script(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, AppError> {
    let host = request_host(&headers, &uri);
    let script = url_rewrite::render_script(&state.settings.url_rewrite_pairs(&host))?;

    Ok(([(header::CONTENT_TYPE, "application/javascript")], script))
}
