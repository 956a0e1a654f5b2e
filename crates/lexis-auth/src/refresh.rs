use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as B64, URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use lexis_db::Database;
use lexis_db::models::RefreshTokenRow;
use lexis_types::models::AuthTokens;

use crate::credentials::CredentialStore;
use crate::devices::device_pair;
use crate::error::{AuthResult, RefreshRejection};
use crate::store::blocking;
use crate::tokens::TokenIssuer;

const TOKEN_BYTES: usize = 64;

/// 64 random bytes, URL-safe base64 without padding.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of the UTF-8 token, standard base64. This is the only form persisted.
pub fn hash_token(token: &str) -> String {
    B64.encode(Sha256::digest(token.as_bytes()))
}

/// A freshly stored refresh token together with its plaintext, which the
/// caller must hand to the client and then forget.
pub struct IssuedRefreshToken {
    pub record: RefreshTokenRow,
    pub token: String,
}

/// Persists hashed refresh tokens and enforces rotation, expiry, revocation and
/// device binding.
#[derive(Clone)]
pub struct RefreshLedger {
    db: Arc<Database>,
    credentials: CredentialStore,
    issuer: Arc<TokenIssuer>,
    lifetime: chrono::Duration,
}

impl RefreshLedger {
    pub fn new(
        db: Arc<Database>,
        credentials: CredentialStore,
        issuer: Arc<TokenIssuer>,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            db,
            credentials,
            issuer,
            lifetime: lifetime.max(chrono::Duration::days(1)),
        }
    }

    pub async fn issue(
        &self,
        user_id: i64,
        device_id: Option<i64>,
    ) -> AuthResult<IssuedRefreshToken> {
        let token = generate_token_value();
        let token_hash = hash_token(&token);
        let lifetime = self.lifetime;

        let record = blocking(&self.db, move |db| {
            let now = Utc::now();
            db.insert_refresh_token(user_id, device_id, &token_hash, now, now + lifetime)
        })
        .await?;

        info!("Issued refresh token {} for user {}", record.id, user_id);
        Ok(IssuedRefreshToken { record, token })
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// The successor inherits the stored token's user and device; the device
    /// hint is only used to check the binding, never to re-resolve it.
    pub async fn rotate(
        &self,
        presented: &str,
        device_key: Option<&str>,
        platform: Option<&str>,
    ) -> AuthResult<AuthTokens> {
        let stored = self.validate_presented(presented, device_key, platform).await?;

        let Some(user) = self.credentials.find_by_id(stored.user_id).await? else {
            error!(
                "Refresh token {} references missing user {}",
                stored.id, stored.user_id
            );
            return Err(RefreshRejection::UserNotFound.into());
        };

        let roles = self.credentials.roles(user.id).await?;
        let (access_token, access_token_expires_at) = self.issuer.issue(&user, &roles)?;

        let token = generate_token_value();
        let token_hash = hash_token(&token);
        let lifetime = self.lifetime;
        let (old_id, user_id, device_id) = (stored.id, stored.user_id, stored.device_id);

        let successor = blocking(&self.db, move |db| {
            let now = Utc::now();
            db.rotate_refresh_token(old_id, user_id, device_id, &token_hash, now, now + lifetime)
        })
        .await?;

        let Some(successor) = successor else {
            warn!("Refresh token {} was rotated concurrently", old_id);
            return Err(RefreshRejection::Revoked.into());
        };

        info!(
            "Rotated refresh token {} -> {} for user {}",
            old_id, successor.id, user_id
        );
        Ok(AuthTokens {
            access_token,
            refresh_token: token,
            access_token_expires_at,
        })
    }

    /// Runs the rotation checks in order; the first failure wins.
    async fn validate_presented(
        &self,
        presented: &str,
        device_key: Option<&str>,
        platform: Option<&str>,
    ) -> AuthResult<RefreshTokenRow> {
        if presented.trim().is_empty() {
            return Err(RefreshRejection::Required.into());
        }

        let token_hash = hash_token(presented);
        let device = device_pair(device_key, platform);

        let (stored, device_row) = blocking(&self.db, move |db| {
            let stored = db.get_refresh_token_by_hash(&token_hash)?;
            let device_row = match &device {
                Some((key, _)) => db.find_device_by_key(key)?,
                None => None,
            };
            Ok((stored, device_row))
        })
        .await?;

        let stored = stored.ok_or(RefreshRejection::NotFound)?;

        if stored.is_revoked() {
            return Err(RefreshRejection::Revoked.into());
        }

        if stored.is_expired(Utc::now()) {
            return Err(RefreshRejection::Expired.into());
        }

        if device_pair(device_key, platform).is_some() {
            let bound = device_row.is_some_and(|d| Some(d.id) == stored.device_id);
            if !bound {
                warn!("Refresh token {} presented from an unbound device", stored.id);
                return Err(RefreshRejection::DeviceMismatch.into());
            }
        }

        Ok(stored)
    }

    /// Logout. Unknown and already-revoked tokens succeed without side effects.
    pub async fn revoke(&self, presented: &str) -> AuthResult<()> {
        if presented.trim().is_empty() {
            return Err(RefreshRejection::Required.into());
        }

        let token_hash = hash_token(presented);
        let revoked = blocking(&self.db, move |db| {
            let Some(stored) = db.get_refresh_token_by_hash(&token_hash)? else {
                return Ok(None);
            };
            let changed = db.revoke_refresh_token(stored.id, Utc::now())?;
            Ok(changed.then_some(stored.id))
        })
        .await?;

        if let Some(id) = revoked {
            info!("Revoked refresh token {}", id);
        }
        Ok(())
    }
}
