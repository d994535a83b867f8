use axum::{routing::get, Router};
use chrono::{SecondsFormat, Utc};
use tower_http::services::ServeDir;
use std::path::Path;
use crate::settings::Config;
use log::info;
use anyhow::Error;
type AppError = Error;

pub const ABOUT: &str = "mail-scanner A utility to scan mailboxes for security issues";

// Simple endpoint that returns the current time
async fn time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Simple endpoint that returns an about message
async fn about() -> &'static str {
    ABOUT
}

async fn start_server(router: Router, host: &str, port: u16) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Server listening on port {}", port);
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn create_router(static_dir: &Path) -> Router {
    Router::new()
        .route("/api/time", get(time))
        .route("/api/about", get(about))
        // Serve static files
        .fallback_service(ServeDir::new(static_dir))
}

pub async fn entrypoint(config: &Config) -> Result<(), AppError> {
    let router = create_router(&config.server.static_dir);
    start_server(router, &config.server.host, config.server.effective_port()).await
}
