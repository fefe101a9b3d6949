use crate::{
    db,
    error::StoreError,
    models::{LinkWithRule, ShortLink},
    service, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Request / response types ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    pub url: String,
    /// TTL token: "3h", "6h", or anything else for no expiry.
    #[serde(default)]
    pub ttl: String,
    /// Click cap as a digit string; anything else means no limit.
    #[serde(default)]
    pub max_clicks: String,
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub ttl: String,
    #[serde(default)]
    pub max_clicks: String,
}

#[derive(Serialize)]
pub struct LinkResponse {
    pub id: i64,
    pub code: String,
    pub short_url: String,
    pub original_url: String,
    pub created_at: NaiveDateTime,
    pub clicks: i64,
    pub expires_at: Option<NaiveDateTime>,
    pub max_clicks: Option<i64>,
}

impl LinkResponse {
    fn from_row(row: LinkWithRule, base_url: &str) -> Self {
        Self {
            short_url: format!("{}/{}", base_url, row.code),
            id: row.id,
            code: row.code,
            original_url: row.original_url,
            created_at: row.created_at,
            clicks: row.clicks,
            expires_at: row.expires_at,
            max_clicks: row.max_clicks,
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /admin/links
///
/// All links, newest first, with their rule fields inlined.
pub async fn list_links(State(state): State<Arc<AppState>>) -> Response {
    match db::list_links(&state.db).await {
        Ok(rows) => {
            let links: Vec<LinkResponse> = rows
                .into_iter()
                .map(|row| LinkResponse::from_row(row, &state.config.base_url))
                .collect();
            Json(links).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to list links: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// POST /admin/links
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLinkRequest>,
) -> Response {
    if req.url.trim().is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "URL must not be empty").into_response();
    }

    match service::create_short_link(&state.db, &req.url, &req.ttl, &req.max_clicks).await {
        Ok(link) => {
            tracing::info!("created link code={} url={}", link.code, link.original_url);
            let row = link_with_rule(&state, link).await;
            match row {
                Ok(row) => (
                    StatusCode::CREATED,
                    Json(LinkResponse::from_row(row, &state.config.base_url)),
                )
                    .into_response(),
                Err(e) => {
                    tracing::error!("Failed to load created link: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
                }
            }
        }
        Err(e) => {
            tracing::error!("Failed to create link: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// POST /admin/links/:id/rule
///
/// Upsert the rule from the desired final TTL / cap pair.
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRuleRequest>,
) -> Response {
    let link = match fetch_link(&state, id).await {
        Ok(link) => link,
        Err(resp) => return resp,
    };

    match service::update_rule(&state.db, &link, &req.ttl, &req.max_clicks).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!("Failed to update rule for link {}: {:?}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// POST /admin/links/:id/reset
pub async fn reset_clicks(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let link = match fetch_link(&state, id).await {
        Ok(link) => link,
        Err(resp) => return resp,
    };

    match service::reset_clicks(&state.db, &link).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!("Failed to reset clicks for link {}: {:?}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// POST /admin/links/:id/delete
pub async fn delete_link(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let link = match fetch_link(&state, id).await {
        Ok(link) => link,
        Err(resp) => return resp,
    };

    match service::delete_short_link(&state.db, &link).await {
        Ok(()) => {
            tracing::info!("deleted link code={}", link.code);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::error!("Failed to delete link {}: {:?}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Look up a link by id, mapping absence and store failures to a response.
async fn fetch_link(state: &AppState, id: i64) -> Result<ShortLink, Response> {
    match db::require_link(&state.db, id).await {
        Ok(link) => Ok(link),
        Err(StoreError::NotFound) => Err((StatusCode::NOT_FOUND, "Link not found").into_response()),
        Err(e) => {
            tracing::error!("Failed to fetch link {}: {:?}", id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response())
        }
    }
}

/// Join a freshly created link with its (possible) rule for the response.
async fn link_with_rule(state: &AppState, link: ShortLink) -> Result<LinkWithRule, StoreError> {
    let rule = db::get_rule(&state.db, link.id).await?;
    Ok(LinkWithRule {
        id: link.id,
        code: link.code,
        original_url: link.original_url,
        created_at: link.created_at,
        clicks: link.clicks,
        expires_at: rule.as_ref().and_then(|r| r.expires_at),
        max_clicks: rule.as_ref().and_then(|r| r.max_clicks),
    })
}
