use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info};

use lexis_db::Database;

use crate::credentials::{CredentialStore, normalize_email, password_errors};
use crate::email::EmailSender;
use crate::error::{AuthError, AuthResult};
use crate::refresh::hash_token;
use crate::store::blocking;

const RESET_SUBJECT: &str = "Password reset code";

/// Wrong guesses allowed before an outstanding code is discarded.
pub const MAX_RESET_ATTEMPTS: i64 = 5;

fn is_reset_code(token: &str) -> bool {
    token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit())
}

/// Four-digit, single-use password reset codes delivered by email.
#[derive(Clone)]
pub struct PasswordResetService {
    db: Arc<Database>,
    credentials: CredentialStore,
    mailer: Arc<dyn EmailSender>,
    lifetime: chrono::Duration,
}

impl PasswordResetService {
    pub fn new(
        db: Arc<Database>,
        credentials: CredentialStore,
        mailer: Arc<dyn EmailSender>,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            db,
            credentials,
            mailer,
            lifetime,
        }
    }

    /// Sends a fresh code to a known address. Unknown addresses succeed
    /// silently so the endpoint does not reveal which emails are registered.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let Some(user) = self.credentials.find_by_email(email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let code = format!("{:04}", rand::rng().random_range(0..10_000));
        let code_hash = hash_token(&code);
        let normalized = normalize_email(&user.email);
        let lifetime = self.lifetime;

        blocking(&self.db, move |db| {
            let now = Utc::now();
            let purged = db.purge_expired_reset_codes(now)?;
            if purged > 0 {
                debug!("Purged {} expired reset codes", purged);
            }
            db.upsert_reset_code(&normalized, &code_hash, now + lifetime)
        })
        .await?;

        self.mailer
            .send(&user.email, RESET_SUBJECT, &format!("Your reset code: {}", code))
            .await
            .map_err(|e| {
                error!("Failed to send reset code to user {}: {}", user.id, e);
                AuthError::Store(e)
            })?;

        info!("Issued password reset code for user {}", user.id);
        Ok(())
    }

    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let token = token.trim();
        let mut errors = Vec::new();
        if !is_reset_code(token) {
            errors.push("Token must be a 4-digit code.".to_string());
        }
        errors.extend(password_errors(new_password));
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let Some(user) = self.credentials.find_by_email(email).await? else {
            return Err(AuthError::NotFound("User not found.".to_string()));
        };

        let code_hash = hash_token(token);
        let normalized = normalize_email(&user.email);
        let consumed = blocking(&self.db, move |db| {
            db.consume_reset_code(&normalized, &code_hash, Utc::now(), MAX_RESET_ATTEMPTS)
        })
        .await?;

        if !consumed {
            return Err(AuthError::validation("Invalid token."));
        }

        self.credentials.set_password(user.id, new_password).await?;
        info!("Password reset for user {}", user.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl CapturingSender {
        fn last_code(&self) -> String {
            let sent = self.sent.lock().unwrap();
            let (_, _, body) = sent.last().expect("no email sent");
            body.trim_start_matches("Your reset code: ").to_string()
        }
    }

    #[async_trait]
    impl EmailSender for CapturingSender {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    async fn service(
        mailer: Arc<dyn EmailSender>,
        lifetime: chrono::Duration,
    ) -> (PasswordResetService, CredentialStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let credentials = CredentialStore::new(db.clone());
        credentials.register("a@x.com", "secret1", None).await.unwrap();
        (
            PasswordResetService::new(db, credentials.clone(), mailer, lifetime),
            credentials,
        )
    }

    #[test]
    fn reset_codes_are_exactly_four_digits() {
        assert!(is_reset_code("0042"));
        assert!(!is_reset_code("042"));
        assert!(!is_reset_code("12345"));
        assert!(!is_reset_code("12a4"));
    }

    #[tokio::test]
    async fn code_resets_password_once() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, credentials) = service(mailer.clone(), chrono::Duration::minutes(15)).await;

        resets.forgot_password("A@X.com").await.unwrap();
        let code = mailer.last_code();
        {
            let sent = mailer.sent.lock().unwrap();
            assert_eq!(sent[0].0, "a@x.com");
            assert_eq!(sent[0].1, "Password reset code");
        }

        resets.reset_password("a@x.com", &code, "newpass").await.unwrap();
        assert!(credentials.check_password("a@x.com", "newpass").await.unwrap().is_some());
        assert!(credentials.check_password("a@x.com", "secret1").await.unwrap().is_none());

        let err = resets.reset_password("a@x.com", &code, "another").await.unwrap_err();
        assert_eq!(err.messages(), vec!["Invalid token."]);
    }

    #[tokio::test]
    async fn new_request_replaces_previous_code() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, _) = service(mailer.clone(), chrono::Duration::minutes(15)).await;

        resets.forgot_password("a@x.com").await.unwrap();
        let first = mailer.last_code();
        loop {
            resets.forgot_password("a@x.com").await.unwrap();
            if mailer.last_code() != first {
                break;
            }
        }

        let err = resets.reset_password("a@x.com", &first, "newpass").await.unwrap_err();
        assert_eq!(err.messages(), vec!["Invalid token."]);
        let second = mailer.last_code();
        resets.reset_password("a@x.com", &second, "newpass").await.unwrap();
    }

    #[tokio::test]
    async fn repeated_wrong_guesses_burn_the_code() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, credentials) = service(mailer.clone(), chrono::Duration::minutes(15)).await;

        resets.forgot_password("a@x.com").await.unwrap();
        let code = mailer.last_code();
        let wrong: Vec<String> = (0..10_000)
            .map(|n| format!("{:04}", n))
            .filter(|guess| *guess != code)
            .take(MAX_RESET_ATTEMPTS as usize)
            .collect();

        for guess in &wrong {
            let err = resets.reset_password("a@x.com", guess, "pwned1").await.unwrap_err();
            assert_eq!(err.messages(), vec!["Invalid token."]);
        }

        let err = resets.reset_password("a@x.com", &code, "pwned1").await.unwrap_err();
        assert_eq!(err.messages(), vec!["Invalid token."]);
        assert!(credentials.check_password("a@x.com", "pwned1").await.unwrap().is_none());
        assert!(credentials.check_password("a@x.com", "secret1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, _) = service(mailer.clone(), chrono::Duration::minutes(-1)).await;

        resets.forgot_password("a@x.com").await.unwrap();
        let err = resets
            .reset_password("a@x.com", &mailer.last_code(), "newpass")
            .await
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Invalid token."]);
    }

    #[tokio::test]
    async fn unknown_email_is_silent_on_forgot_and_not_found_on_reset() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, _) = service(mailer.clone(), chrono::Duration::minutes(15)).await;

        resets.forgot_password("nobody@x.com").await.unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());

        let err = resets.reset_password("nobody@x.com", "1234", "newpass").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_input_reports_all_problems() {
        let mailer = Arc::new(CapturingSender::default());
        let (resets, _) = service(mailer, chrono::Duration::minutes(15)).await;

        let err = resets.reset_password("a@x.com", "12", "abc").await.unwrap_err();
        assert_eq!(
            err.messages(),
            vec![
                "Token must be a 4-digit code.",
                "Passwords must be at least 6 characters."
            ]
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_an_error() {
        let (resets, _) = service(Arc::new(FailingSender), chrono::Duration::minutes(15)).await;
        let err = resets.forgot_password("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }
}
