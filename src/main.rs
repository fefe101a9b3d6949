use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod access;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod service;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting shortgate on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    // Open SQLite connection pool, creating the file if it doesn't exist yet
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .foreign_keys(true),
        )
        .await?;

    // Run embedded migrations (files in migrations/)
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let state = Arc::new(AppState { db, config });

    // ── Router ─────────────────────────────────────────────────────────────
    let admin_router = Router::new()
        .route(
            "/links",
            get(handlers::admin::list_links).post(handlers::admin::create_link),
        )
        .route("/links/:id/rule", post(handlers::admin::update_rule))
        .route("/links/:id/reset", post(handlers::admin::reset_clicks))
        .route("/links/:id/delete", post(handlers::admin::delete_link));

    let app = Router::new()
        // Health check — returns 200 OK
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        // Admin API (all under /admin/*)
        .nest("/admin", admin_router)
        // Short-link redirect — must come LAST so /admin/* takes priority
        .route("/:code", get(handlers::redirect::redirect))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    // ── Serve ──────────────────────────────────────────────────────────────
    let bind_addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
