use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{Session, UserPublic};
use crate::routes::AppState;
use crate::services::identity::{self, ProfileUpdate};

#[derive(Debug, Deserialize)]
pub struct ChangePinRequest {
    pub current_pin: String,
    pub new_pin: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePhoneRequest {
    pub new_phone: String,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ProfileUpdate>,
) -> AppResult<Json<UserPublic>> {
    let user = identity::update_profile(state.store.as_ref(), &state.sessions, &session, body)?;
    Ok(Json(user))
}

pub async fn change_pin(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ChangePinRequest>,
) -> AppResult<Json<UserPublic>> {
    let user = identity::change_pin(
        state.store.as_ref(),
        &state.sessions,
        &session,
        &body.current_pin,
        &body.new_pin,
    )?;
    Ok(Json(user))
}

pub async fn change_phone(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ChangePhoneRequest>,
) -> AppResult<Json<UserPublic>> {
    let user = identity::change_phone(
        state.store.as_ref(),
        &state.sessions,
        &session,
        &body.new_phone,
    )?;
    Ok(Json(user))
}
