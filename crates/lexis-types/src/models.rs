use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Access-token claims. Written by the token issuer in lexis-auth and read back
/// by the bearer middleware in lexis-api.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id in string form.
    pub sub: String,
    pub email: String,
    /// Unique per token. Not consulted by the server itself.
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Token pair handed back to a client after login, registration or refresh.
/// The refresh token is only ever visible here; the ledger stores its hash.
#[derive(Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token_values() {
        let tokens = AuthTokens {
            access_token: "header.payload.sig".into(),
            refresh_token: "very-secret-refresh".into(),
            access_token_expires_at: Utc::now(),
        };

        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("very-secret-refresh"));
        assert!(!rendered.contains("header.payload.sig"));
    }

    #[test]
    fn claims_omit_empty_optional_fields() {
        let claims = Claims {
            sub: "7".into(),
            email: "a@x.com".into(),
            jti: "abc".into(),
            name: None,
            roles: vec![],
            iss: "lexis".into(),
            aud: "lexis-clients".into(),
            iat: 0,
            nbf: 0,
            exp: 60,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("name").is_none());
        assert!(json.get("roles").is_none());
        assert_eq!(json["sub"], "7");
    }
}
