use crate::{
    service::{self, Resolution},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

/// GET /:code
///
/// The resolution protocol end-to-end: look up the link, evaluate its
/// rule, record the click, redirect. An unknown code is a 404 and an
/// expired link a 410 so callers can tell the two terminal states apart.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    tracing::info!("resolve attempt code={}", code);

    match service::resolve(&state.db, &code).await {
        Ok(Resolution::Redirect(url)) => {
            tracing::info!("redirecting code={} to {}", code, url);
            Redirect::to(&url).into_response()
        }
        Ok(Resolution::NotFound) => {
            tracing::info!("not found code={}", code);
            (StatusCode::NOT_FOUND, "Short link not found").into_response()
        }
        Ok(Resolution::Blocked(reason)) => {
            tracing::info!("blocked code={} reason={}", code, reason.as_str());
            (StatusCode::GONE, "Short link expired").into_response()
        }
        Err(e) => {
            tracing::error!("DB error resolving code '{}': {:?}", code, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
