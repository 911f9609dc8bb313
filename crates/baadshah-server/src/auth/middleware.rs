use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::error::AppError;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "baadshah_session";

/// Resolves the session cookie into a `Session` request extension.
///
/// No cookie at all is `Unauthorized`; a cookie whose session is gone or
/// past its expiry is `SessionExpired`.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let session = state
        .sessions
        .current(&token)
        .ok_or(AppError::SessionExpired)?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
