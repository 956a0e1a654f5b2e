use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use lexis_types::api::{ForgotPasswordRequest, ResetPasswordRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// Always 204 for well-formed requests so the response does not reveal
/// whether the address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    if req.email.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Email is required."));
    }

    state.resets.forgot_password(&req.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    state
        .resets
        .reset_password(&req.email, &req.token, &req.new_password)
        .await
        .map_err(|e| ApiError::from_auth(e, StatusCode::NOT_FOUND))?;
    Ok(StatusCode::NO_CONTENT)
}
