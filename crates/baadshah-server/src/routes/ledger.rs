use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{Money, Session};
use crate::routes::AppState;
use crate::services::ledger::{self, LedgerReceipt};

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub amount: Money,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub receiver_phone: String,
    pub amount: Money,
    pub description: Option<String>,
}

pub async fn deposit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<MovementRequest>,
) -> AppResult<Json<LedgerReceipt>> {
    let receipt = ledger::deposit(
        state.store.as_ref(),
        &state.sessions,
        &session,
        body.amount,
        body.description.as_deref(),
    )?;
    Ok(Json(receipt))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<MovementRequest>,
) -> AppResult<Json<LedgerReceipt>> {
    let receipt = ledger::withdraw(
        state.store.as_ref(),
        &state.sessions,
        &session,
        body.amount,
        body.description.as_deref(),
    )?;
    Ok(Json(receipt))
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<TransferRequest>,
) -> AppResult<Json<LedgerReceipt>> {
    let receipt = ledger::transfer(
        state.store.as_ref(),
        &state.sessions,
        &session,
        &body.receiver_phone,
        body.amount,
        body.description.as_deref(),
    )?;
    Ok(Json(receipt))
}
