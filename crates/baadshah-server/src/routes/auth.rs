use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::auth::middleware::SESSION_COOKIE;
use crate::error::AppResult;
use crate::models::Session;
use crate::routes::AppState;
use crate::services::identity::{self, Registration};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub pin: String,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<Registration>,
) -> AppResult<impl IntoResponse> {
    let session = identity::register(
        state.store.as_ref(),
        &state.sessions,
        body,
        state.config.initial_balance,
    )?;

    let cookie = build_session_cookie(&state, session.token.clone());
    Ok((StatusCode::CREATED, jar.add(cookie), Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let session = identity::login(state.store.as_ref(), &state.sessions, &body.phone, &body.pin)?;

    let cookie = build_session_cookie(&state, session.token.clone());
    Ok((jar.add(cookie), Json(session)))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        identity::logout(&state.sessions, cookie.value());
    }

    let removal = Cookie::build(SESSION_COOKIE)
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build();

    (jar.add(removal), Json(serde_json::json!({"ok": true})))
}

pub async fn me(Extension(session): Extension<Session>) -> Json<Session> {
    Json(session)
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> AppResult<Json<Session>> {
    let session = identity::refresh(state.store.as_ref(), &state.sessions, &session)?;
    Ok(Json(session))
}

fn build_session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .max_age(time::Duration::seconds(state.sessions.ttl().num_seconds()))
        .http_only(true)
        .secure(state.config.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}
