//! Canvas Server: the server-side core of a multi-user collaborative
//! canvas — scene state, operation history, undo/redo sync, and media
//! ingestion, wired up behind an Axum HTTP + WebSocket surface.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod middleware;
mod shutdown;
mod state;

use canvas_collab::{CollaborationManager, RoomTranscodeObserver};
use canvas_media::TranscodeQueue;
use canvas_store::Store;
use middleware::rate_limit::RateLimitLayer;
use shutdown::{shutdown_signal, ShutdownController};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();

    let config = config::load().context("failed to load configuration")?;

    if let Some(parent) = std::path::Path::new(&config.storage.database_path).parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.media.uploads_dir).context("failed to create uploads directory")?;
    std::fs::create_dir_all(&config.media.thumbnails_dir).context("failed to create thumbnails directory")?;
    std::fs::create_dir_all(&config.media.transcodes_dir).context("failed to create transcodes directory")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&format!("sqlite://{}?mode=rwc", config.storage.database_path))
        .await
        .context("failed to open database")?;

    let store = Store::new(pool);
    store.init().await.context("failed to run database migrations")?;

    let manager = Arc::new(CollaborationManager::new(store.clone()));
    let observer = Arc::new(RoomTranscodeObserver::new(store.clone(), manager.sessions().clone()));

    let shutdown = ShutdownController::new();

    let transcode_queue = TranscodeQueue::new(
        store.clone(),
        config.media.clone(),
        observer,
        shutdown.token(),
    );

    tokio::spawn(canvas_media::run_cleanup_scheduler(
        store.clone(),
        config.media.clone(),
        shutdown.token(),
    ));

    let app_state = AppState {
        store,
        manager,
        transcode_queue,
        media_config: config.media.clone(),
        cors_origins: config.server.cors_origins.clone(),
    };

    let cors = if app_state.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = app_state
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let rate_limit = RateLimitLayer::new(&config.rate_limit);
    rate_limit.state().spawn_cleanup();

    let app: Router = api::routes()
        .with_state(app_state)
        .layer(rate_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "canvas server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("server error")?;

    Ok(())
}
