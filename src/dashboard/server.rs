use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::auth::{IdentityProvider, LocalIdentityProvider};
use super::db::{DbHandle, JobDb};
use crate::config::{AuthSection, JobboardConfig, ProviderKind};

/// Build the full application router: sync protocol, auth routes and, when
/// a frontend build is configured, the SPA with `index.html` fallback.
pub fn build_router(state: Arc<AppState>, static_dir: Option<&PathBuf>) -> Router {
    let router = api::api_router();
    let router = match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => router.fallback(no_frontend),
    };
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn no_frontend() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "No frontend configured. Set server.static_dir or JOBBOARD_STATIC_DIR.",
    )
}

pub fn identity_provider(auth: &AuthSection) -> Arc<dyn IdentityProvider> {
    match auth.provider {
        ProviderKind::Local => Arc::new(LocalIdentityProvider::default()),
    }
}

/// Open the store at `config.server.db_path`, creating its directory.
pub fn open_store(config: &JobboardConfig) -> Result<JobDb> {
    let db_path = &config.server.db_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    JobDb::new(db_path).context("Failed to initialize job database")
}

/// Start the dashboard server and run until Ctrl+C.
pub async fn start_server(config: JobboardConfig) -> Result<()> {
    let db = open_store(&config)?;
    let purged = db.purge_expired_sessions()?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        identity: identity_provider(&config.auth),
        auth: config.auth.clone(),
    });

    let mut app = build_router(state, config.server.static_dir.as_ref());

    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    // Dev mode is reached from a container or a Vite dev server on another host.
    let host = if config.server.dev_mode {
        "0.0.0.0"
    } else {
        config.server.host.as_str()
    };
    let addr = format!("{}:{}", host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, db = %config.server.db_path.display(), "job board listening");
    println!("Job board running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
