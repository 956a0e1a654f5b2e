//! Sign-in through external identity providers.
//!
//! A provider turns an authorization code into an [`IdentityAssertion`]; the
//! bridge maps that assertion onto a local account, creating or linking one as
//! needed.

pub mod google;

use async_trait::async_trait;
use tracing::info;

use lexis_types::models::User;

use crate::credentials::CredentialStore;
use crate::error::{AuthError, AuthResult};

pub use google::GoogleProvider;

/// Verified identity claims extracted from a provider's id token.
#[derive(Debug, Clone, Default)]
pub struct IdentityAssertion {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
}

#[async_trait]
pub trait FederatedIdentityProvider: Send + Sync {
    /// Login provider name stored with linked accounts, e.g. "Google".
    fn name(&self) -> &'static str;

    /// Exchanges an authorization code and verifies the returned identity.
    /// `redirect_uri` overrides the configured one when present.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<IdentityAssertion>;
}

#[derive(Clone)]
pub struct FederatedIdentityBridge {
    credentials: CredentialStore,
}

impl FederatedIdentityBridge {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    /// Returns the local user for a provider code and whether it was created
    /// by this call.
    pub async fn authenticate_by_code(
        &self,
        provider: &dyn FederatedIdentityProvider,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<(User, bool)> {
        let assertion = provider.exchange_code(code, redirect_uri).await?;
        self.link(provider.name(), assertion).await
    }

    async fn link(&self, provider: &str, assertion: IdentityAssertion) -> AuthResult<(User, bool)> {
        let subject = assertion.subject.trim();
        let email = assertion.email.trim();
        if subject.is_empty() || email.is_empty() {
            return Err(AuthError::validation(format!(
                "{} token does not contain required claims.",
                provider
            )));
        }

        if let Some(user) = self.credentials.find_by_login(provider, subject).await? {
            return Ok((user, false));
        }

        let name = assertion
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let (user, is_new_user) = match self.credentials.find_by_email(email).await? {
            None => {
                let user = self
                    .credentials
                    .create_external(email, name, assertion.email_verified)
                    .await?;
                info!("Created user {} from {} sign-in", user.id, provider);
                (user, true)
            }
            Some(mut user) => {
                if user.name.is_none() {
                    if let Some(name) = name {
                        self.credentials.set_name(user.id, name).await?;
                        user.name = Some(name.to_string());
                    }
                }
                (user, false)
            }
        };

        self.credentials.add_login(user.id, provider, subject).await?;
        info!("Linked {} login to user {}", provider, user.id);

        Ok((user, is_new_user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_db::Database;
    use std::sync::Arc;

    struct StubProvider(IdentityAssertion);

    #[async_trait]
    impl FederatedIdentityProvider for StubProvider {
        fn name(&self) -> &'static str {
            "Google"
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _redirect_uri: Option<&str>,
        ) -> AuthResult<IdentityAssertion> {
            Ok(self.0.clone())
        }
    }

    fn assertion(subject: &str, email: &str, name: Option<&str>) -> StubProvider {
        StubProvider(IdentityAssertion {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: name.map(str::to_string),
        })
    }

    fn bridge() -> (FederatedIdentityBridge, CredentialStore) {
        let credentials = CredentialStore::new(Arc::new(Database::open_in_memory().unwrap()));
        (FederatedIdentityBridge::new(credentials.clone()), credentials)
    }

    #[tokio::test]
    async fn first_sign_in_creates_confirmed_user() {
        let (bridge, credentials) = bridge();
        let provider = assertion("g-1", "new@x.com", Some("Ann"));

        let (user, is_new) = bridge.authenticate_by_code(&provider, "code", None).await.unwrap();
        assert!(is_new);
        assert!(user.email_confirmed);
        assert_eq!(user.name.as_deref(), Some("Ann"));

        let (again, is_new) = bridge.authenticate_by_code(&provider, "code", None).await.unwrap();
        assert!(!is_new);
        assert_eq!(again.id, user.id);
        assert_eq!(credentials.find_by_login("Google", "g-1").await.unwrap().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn existing_email_is_linked_and_name_backfilled() {
        let (bridge, credentials) = bridge();
        let existing = credentials.register("A@X.com", "secret1", None).await.unwrap();

        let provider = assertion("g-2", "a@x.com", Some("Ann"));
        let (user, is_new) = bridge.authenticate_by_code(&provider, "code", None).await.unwrap();
        assert!(!is_new);
        assert_eq!(user.id, existing.id);
        assert_eq!(user.name.as_deref(), Some("Ann"));

        let stored = credentials.find_by_id(existing.id).await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn existing_name_is_not_overwritten() {
        let (bridge, credentials) = bridge();
        credentials.register("a@x.com", "secret1", Some("Original")).await.unwrap();

        let provider = assertion("g-3", "a@x.com", Some("Other"));
        let (user, _) = bridge.authenticate_by_code(&provider, "code", None).await.unwrap();
        assert_eq!(user.name.as_deref(), Some("Original"));
    }

    #[tokio::test]
    async fn missing_claims_are_rejected() {
        let (bridge, _) = bridge();
        let provider = assertion("", "a@x.com", None);

        let err = bridge.authenticate_by_code(&provider, "code", None).await.unwrap_err();
        assert_eq!(err.messages(), vec!["Google token does not contain required claims."]);
    }

    #[tokio::test]
    async fn second_subject_for_same_account_is_linked_too() {
        let (bridge, credentials) = bridge();
        let (first, _) = bridge
            .authenticate_by_code(&assertion("g-4", "a@x.com", None), "code", None)
            .await
            .unwrap();
        let (second, is_new) = bridge
            .authenticate_by_code(&assertion("g-5", "a@x.com", None), "code", None)
            .await
            .unwrap();

        assert!(!is_new);
        assert_eq!(first.id, second.id);
        assert!(credentials.find_by_login("Google", "g-5").await.unwrap().is_some());
    }
}
