use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Why a presented refresh token was not accepted. Checks run in declaration
/// order and the first failing one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefreshRejection {
    #[error("Refresh token is required.")]
    Required,
    #[error("Refresh token not found.")]
    NotFound,
    #[error("Refresh token revoked.")]
    Revoked,
    #[error("Refresh token expired.")]
    Expired,
    #[error("Refresh token device mismatch.")]
    DeviceMismatch,
    #[error("User not found.")]
    UserNotFound,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad input. Every message is reported to the caller.
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),

    /// Uniform login failure; never says which half of the pair was wrong.
    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error(transparent)]
    Refresh(#[from] RefreshRejection),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Configuration(String),

    /// Identity provider answered with an error or something unparseable.
    #[error("{0}")]
    ExternalService(String),

    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        AuthError::Validation(vec![message.into()])
    }

    /// Messages safe to return in a response body.
    pub fn messages(&self) -> Vec<String> {
        match self {
            AuthError::Validation(errors) => errors.clone(),
            AuthError::Store(_) => vec!["An unexpected error occurred.".to_string()],
            other => vec![other.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_do_not_leak_details() {
        let err = AuthError::Store(anyhow::anyhow!("disk I/O error at /var/lib/lexis.db"));
        assert_eq!(err.messages(), vec!["An unexpected error occurred."]);
    }

    #[test]
    fn refresh_rejections_render_their_message() {
        let err: AuthError = RefreshRejection::NotFound.into();
        assert_eq!(err.messages(), vec!["Refresh token not found."]);
    }
}
