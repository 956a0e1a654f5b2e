use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use lexis_db::Database;
use lexis_types::models::{AuthTokens, User};

use crate::config::{AuthConfig, GoogleOptions};
use crate::credentials::CredentialStore;
use crate::devices::DeviceRegistry;
use crate::error::{AuthError, AuthResult};
use crate::federated::{FederatedIdentityBridge, FederatedIdentityProvider, GoogleProvider};
use crate::refresh::RefreshLedger;
use crate::tokens::TokenIssuer;

/// Optional client device identification sent with sign-in requests.
#[derive(Debug, Clone, Default)]
pub struct DeviceHint {
    pub device_key: Option<String>,
    pub platform: Option<String>,
}

impl DeviceHint {
    pub fn new(device_key: Option<String>, platform: Option<String>) -> Self {
        Self { device_key, platform }
    }
}

#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub tokens: AuthTokens,
}

#[derive(Debug)]
pub struct FederatedSession {
    pub user: User,
    pub is_new_user: bool,
    pub tokens: AuthTokens,
}

/// Request-shaped sign-in flows built from the credential store, device
/// registry, token issuer and refresh ledger.
#[derive(Clone)]
pub struct SessionService {
    credentials: CredentialStore,
    devices: DeviceRegistry,
    issuer: Arc<TokenIssuer>,
    ledger: RefreshLedger,
    bridge: FederatedIdentityBridge,
    providers: HashMap<&'static str, Arc<dyn FederatedIdentityProvider>>,
    google: GoogleOptions,
}

impl SessionService {
    pub fn new(db: Arc<Database>, config: &AuthConfig) -> AuthResult<Self> {
        let credentials = CredentialStore::new(db.clone());
        let issuer = Arc::new(TokenIssuer::new(&config.jwt)?);
        let ledger = RefreshLedger::new(
            db.clone(),
            credentials.clone(),
            issuer.clone(),
            config.jwt.refresh_token_lifetime(),
        );
        let google = GoogleProvider::new(config.google.clone(), config.http_timeout)?;

        let service = Self {
            devices: DeviceRegistry::new(db),
            bridge: FederatedIdentityBridge::new(credentials.clone()),
            credentials,
            issuer,
            ledger,
            providers: HashMap::new(),
            google: config.google.clone(),
        };
        Ok(service.with_provider("google", Arc::new(google)))
    }

    /// Registers (or replaces) the provider reachable under `key`.
    pub fn with_provider(
        mut self,
        key: &'static str,
        provider: Arc<dyn FederatedIdentityProvider>,
    ) -> Self {
        self.providers.insert(key, provider);
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn google_options(&self) -> &GoogleOptions {
        &self.google
    }

    /// Every failure other than a store fault is reported as the same
    /// "Invalid credentials." so callers cannot discover which accounts exist.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: &DeviceHint,
    ) -> AuthResult<Session> {
        let user = match self.credentials.check_password(email, password).await {
            Ok(Some(user)) => user,
            Ok(None) | Err(AuthError::Validation(_)) | Err(AuthError::NotFound(_)) => {
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let tokens = self.issue_tokens(&user, device).await?;
        info!("User {} logged in", user.id);
        Ok(Session { user, tokens })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        device: &DeviceHint,
    ) -> AuthResult<Session> {
        let user = self.credentials.register(email, password, name).await?;
        let tokens = self.issue_tokens(&user, device).await?;
        Ok(Session { user, tokens })
    }

    pub async fn federated_login(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: Option<&str>,
        device: &DeviceHint,
    ) -> AuthResult<FederatedSession> {
        let Some(identity_provider) = self.providers.get(provider) else {
            warn!("Sign-in requested for unknown provider '{}'", provider);
            return Err(AuthError::validation(format!(
                "Unsupported identity provider '{}'.",
                provider
            )));
        };

        let (user, is_new_user) = self
            .bridge
            .authenticate_by_code(identity_provider.as_ref(), code, redirect_uri)
            .await?;
        let tokens = self.issue_tokens(&user, device).await?;

        info!(
            "User {} signed in with {} (new: {})",
            user.id,
            identity_provider.name(),
            is_new_user
        );
        Ok(FederatedSession {
            user,
            is_new_user,
            tokens,
        })
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceHint,
    ) -> AuthResult<AuthTokens> {
        self.ledger
            .rotate(
                refresh_token,
                device.device_key.as_deref(),
                device.platform.as_deref(),
            )
            .await
    }

    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        self.ledger.revoke(refresh_token).await
    }

    /// Resolves the device, mints an access token with the current roles and
    /// stores a new refresh token. The steps are not one transaction; each is
    /// safe to repeat.
    pub async fn issue_tokens(
        &self,
        user: &User,
        device: &DeviceHint,
    ) -> AuthResult<AuthTokens> {
        let device_id = self
            .devices
            .resolve(
                user.id,
                device.device_key.as_deref(),
                device.platform.as_deref(),
            )
            .await?;

        let roles = self.credentials.roles(user.id).await?;
        let (access_token, access_token_expires_at) = self.issuer.issue(user, &roles)?;
        let refresh = self.ledger.issue(user.id, device_id).await?;

        Ok(AuthTokens {
            access_token,
            refresh_token: refresh.token,
            access_token_expires_at,
        })
    }
}
