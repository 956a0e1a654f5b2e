use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use lexis_auth::DeviceHint;
use lexis_types::api::{
    AuthResponse, GoogleAuthRequest, GoogleAuthResponse, GoogleConfigResponse, LoginRequest,
    LogoutRequest, MeResponse, RefreshRequest, RefreshResponse, RegisterRequest,
};
use lexis_types::models::Claims;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = body?;
    let device = DeviceHint::new(req.device_key, req.platform);
    let session = state
        .sessions
        .register(&req.email, &req.password, req.name.as_deref(), &device)
        .await?;

    Ok(Json(AuthResponse {
        user: session.user.into(),
        tokens: session.tokens.into(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = body?;
    let device = DeviceHint::new(req.device_key, req.platform);
    let session = state.sessions.login(&req.email, &req.password, &device).await?;

    Ok(Json(AuthResponse {
        user: session.user.into(),
        tokens: session.tokens.into(),
    }))
}

pub async fn google(
    State(state): State<AppState>,
    body: Result<Json<GoogleAuthRequest>, JsonRejection>,
) -> Result<Json<GoogleAuthResponse>, ApiError> {
    let Json(req) = body?;
    let device = DeviceHint::new(req.device_key, req.platform);
    let session = state
        .sessions
        .federated_login("google", &req.code, req.redirect_uri.as_deref(), &device)
        .await?;

    Ok(Json(GoogleAuthResponse {
        user: session.user.into(),
        is_new_user: session.is_new_user,
        tokens: session.tokens.into(),
    }))
}

/// Public client settings for starting the Google consent flow.
pub async fn google_config(State(state): State<AppState>) -> Json<GoogleConfigResponse> {
    let options = state.sessions.google_options();
    Json(GoogleConfigResponse {
        client_id: options.client_id.clone(),
        redirect_uri: options.redirect_uri.clone(),
    })
}

pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let Json(req) = body?;
    let device = DeviceHint::new(req.device_key, req.platform);
    let tokens = state.sessions.refresh(&req.refresh_token, &device).await?;

    Ok(Json(RefreshResponse {
        tokens: tokens.into(),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    state.sessions.logout(&req.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
        roles: claims.roles,
    })
}
