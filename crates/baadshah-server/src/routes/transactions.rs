use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::Session;
use crate::routes::AppState;
use crate::services::history::{self, HistoryEntry};
use crate::store::Page;

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub data: Vec<HistoryEntry>,
    pub total: usize,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ListTransactionsQuery>,
) -> AppResult<Json<TransactionListResponse>> {
    let page = Page {
        limit: query.limit.unwrap_or(50).min(200),
        offset: query.offset.unwrap_or(0),
    };
    let (data, total) = history::history_page(state.store.as_ref(), &session.user.id, page)?;

    Ok(Json(TransactionListResponse { data, total }))
}

pub async fn statement_csv(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> AppResult<impl IntoResponse> {
    let csv = history::statement_csv(state.store.as_ref(), &session.user.id)?;
    let filename = format!(
        "attachment; filename=\"statement-{}.csv\"",
        session.account.account_number
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}
