use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use lexis_auth::AuthError;
use lexis_types::api::ErrorResponse;

/// A failed request: status plus the `{"errors": [...]}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            errors: vec![message.into()],
        }
    }

    /// Maps an auth failure, answering a missing record with `not_found`.
    /// Auth endpoints use 400 here so they do not reveal what was missing.
    pub fn from_auth(err: AuthError, not_found: StatusCode) -> Self {
        let status = match &err {
            AuthError::Validation(_)
            | AuthError::InvalidCredentials
            | AuthError::Refresh(_)
            | AuthError::ExternalService(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => not_found,
            AuthError::Configuration(detail) => {
                error!("Configuration error: {}", detail);
                return Self::internal();
            }
            AuthError::Store(e) => {
                error!("Store error: {:#}", e);
                return Self::internal();
            }
        };

        Self {
            status,
            errors: err.messages(),
        }
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "An unexpected error occurred.")
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::from_auth(err, StatusCode::BAD_REQUEST)
    }
}

/// Malformed or missing bodies are ordinary bad requests with the usual
/// error envelope.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "Request body is required.".to_string(),
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON.".to_string(),
            other => other.body_text(),
        };
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { errors: self.errors })).into_response()
    }
}
