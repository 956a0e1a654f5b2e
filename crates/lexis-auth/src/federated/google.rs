use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::GoogleOptions;
use crate::error::{AuthError, AuthResult};
use crate::federated::{FederatedIdentityProvider, IdentityAssertion};

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);
const LEEWAY_SECS: u64 = 60;

#[derive(Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct GoogleIdClaims {
    sub: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<serde_json::Value>,
    name: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Google OAuth authorization-code flow with id-token verification against
/// Google's published signing keys.
pub struct GoogleProvider {
    options: GoogleOptions,
    http: reqwest::Client,
    jwks: RwLock<Option<CachedKeys>>,
}

impl GoogleProvider {
    pub fn new(options: GoogleOptions, timeout: Duration) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            options,
            http,
            jwks: RwLock::new(None),
        })
    }

    fn exchange_error(detail: impl std::fmt::Display) -> AuthError {
        AuthError::ExternalService(format!("Failed to exchange authorization code. {}", detail))
    }

    async fn fetch_id_token(&self, code: &str, redirect_uri: &str) -> AuthResult<String> {
        let form = [
            ("code", code),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.options.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!("Google token endpoint unreachable: {}", e);
                Self::exchange_error(format!("Google token endpoint request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                Self::exchange_error(format!("Google token endpoint request failed: {}", e))
            })?;

        if !status.is_success() {
            warn!("Google token endpoint returned {}", status.as_u16());
            return Err(Self::exchange_error(format!(
                "Google token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenEndpointResponse = serde_json::from_str(&body)
            .map_err(|_| Self::exchange_error("Google token endpoint returned invalid JSON."))?;

        parsed
            .id_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Self::exchange_error("Google token endpoint response does not contain id_token.")
            })
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, String> {
        debug!("Fetching Google signing keys from {}", self.options.certs_uri);
        let response = self
            .http
            .get(&self.options.certs_uri)
            .send()
            .await
            .map_err(|e| format!("failed to fetch signing keys: {}", e))?;

        if !response.status().is_success() {
            return Err(format!(
                "signing key endpoint returned {}",
                response.status().as_u16()
            ));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| format!("invalid signing key set: {}", e))
    }

    /// Finds the decoding key for `kid`, refreshing the cached key set when it
    /// is stale or does not know the key.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, String> {
        {
            let cache = self.jwks.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk).map_err(|e| e.to_string());
                    }
                }
            }
        }

        let keys = self.fetch_jwks().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|e| e.to_string())?;

        *self.jwks.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| format!("no signing key matches kid '{}'", kid))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleIdClaims, String> {
        let header = jsonwebtoken::decode_header(id_token).map_err(|e| e.to_string())?;
        if header.alg != Algorithm::RS256 {
            return Err(format!("unexpected algorithm {:?}", header.alg));
        }
        let kid = header.kid.ok_or("token header has no kid")?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.options.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS[..]);
        validation.leeway = LEEWAY_SECS;

        jsonwebtoken::decode::<GoogleIdClaims>(id_token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| e.to_string())
    }
}

/// Google sends `email_verified` as a JSON bool, older tokens as a string.
fn is_verified(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[async_trait]
impl FederatedIdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "Google"
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<IdentityAssertion> {
        if !self.options.is_configured() {
            return Err(AuthError::ExternalService("Google auth is not configured.".to_string()));
        }

        let redirect_uri = redirect_uri
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| Some(self.options.redirect_uri.trim()).filter(|r| !r.is_empty()))
            .ok_or_else(|| AuthError::validation("Redirect URI is required."))?;

        let id_token = self.fetch_id_token(code, redirect_uri).await?;

        let claims = self.verify_id_token(&id_token).await.map_err(|reason| {
            warn!("Rejected Google id token: {}", reason);
            AuthError::ExternalService(format!("Invalid Google token: {}", reason))
        })?;

        Ok(IdentityAssertion {
            subject: claims.sub.unwrap_or_default(),
            email: claims.email.unwrap_or_default(),
            email_verified: is_verified(claims.email_verified.as_ref()),
            name: claims.name,
        })
    }
}
