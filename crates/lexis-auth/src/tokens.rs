use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use lexis_types::models::{Claims, User};

use crate::config::JwtOptions;
use crate::error::{AuthError, AuthResult};

/// Allowed clock skew when validating `exp` and `nbf`.
const LEEWAY_SECS: u64 = 60;

/// Mints and validates HS256 access tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: chrono::Duration,
}

impl TokenIssuer {
    /// Fails when the signing key is blank, so a running issuer always has one.
    pub fn new(options: &JwtOptions) -> AuthResult<Self> {
        if options.key.trim().is_empty() {
            return Err(AuthError::Configuration("JWT key is not configured.".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(options.key.as_bytes()),
            decoding_key: DecodingKey::from_secret(options.key.as_bytes()),
            issuer: options.issuer.clone(),
            audience: options.audience.clone(),
            lifetime: options.access_token_lifetime(),
        })
    }

    /// Roles are a snapshot: later role changes only show up in tokens issued after them.
    pub fn issue(&self, user: &User, roles: &[String]) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().simple().to_string(),
            name: user
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            roles: roles.to_vec(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Store(e.into()))?;

        Ok((token, expires_at))
    }

    /// Rejects a bad signature, wrong issuer or audience, and expiry beyond the leeway.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = LEEWAY_SECS;
        validation.validate_nbf = true;

        decode::<Claims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }
}
