mod auth;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;
mod store;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use auth::session::SessionStore;
use axum::http::{header, HeaderValue, Method};
use chrono::Duration;
use config::Config;
use routes::{create_router, AppState};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env file (from repo root)
    dotenvy::from_filename("../../.env").ok();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("baadshah_server=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();
    let port = config.server_port;

    let backend = store::open(&config);
    let sessions = SessionStore::new(backend.sessions, Duration::hours(config.session_ttl_hours));

    let state = AppState {
        store: backend.store,
        sessions,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .expect("CORS_ORIGIN must be a valid header value"),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("baadshah-server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server failed");
}
