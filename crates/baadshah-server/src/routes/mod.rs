mod auth;
mod ledger;
mod profile;
mod transactions;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::require_session;
use crate::auth::session::SessionStore;
use crate::config::Config;
use crate::store::Persistence;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Persistence>,
    pub sessions: SessionStore,
    pub config: Config,
}

async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    // Health checks, no rate limit
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health));

    let mut auth_routes = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout));

    let mut protected = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/account/refresh", post(auth::refresh))
        // Money movement
        .route("/api/v1/ledger/deposit", post(ledger::deposit))
        .route("/api/v1/ledger/withdraw", post(ledger::withdraw))
        .route("/api/v1/ledger/transfer", post(ledger::transfer))
        // History
        .route("/api/v1/transactions", get(transactions::list))
        .route("/api/v1/transactions/csv", get(transactions::statement_csv))
        // Settings
        .route("/api/v1/profile", put(profile::update))
        .route("/api/v1/profile/pin", put(profile::change_pin))
        .route("/api/v1/profile/phone", put(profile::change_phone))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    if state.config.rate_limit_enabled {
        // Auth routes: burst of 10, one token back every 6s per IP
        let auth_governor = GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .finish()
            .expect("valid auth rate limit");

        // Protected API: burst of 120, one token back every 2s per IP
        let api_governor = GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(120)
            .finish()
            .expect("valid api rate limit");

        auth_routes = auth_routes.layer(GovernorLayer::new(Arc::new(auth_governor)));
        protected = protected.layer(GovernorLayer::new(Arc::new(api_governor)));
    }

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(protected)
        .with_state(state)
}
