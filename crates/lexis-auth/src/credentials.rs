use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Utc;
use tracing::{debug, info};

use lexis_db::Database;
use lexis_db::models::{NewUser, UserRow};
use lexis_types::models::User;

use crate::error::{AuthError, AuthResult};
use crate::store::blocking;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Canonical form used for uniqueness and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn password_errors(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Passwords must be at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }
    errors
}

fn email_errors(email: &str) -> Vec<String> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Vec::new()
    } else {
        vec![format!("Email '{}' is invalid.", email)]
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub(crate) fn into_user(row: UserRow) -> User {
    User {
        id: row.id,
        email: row.email,
        name: row.name,
        email_confirmed: row.email_confirmed,
        created_at: row.created_at,
        last_seen: row.last_seen,
    }
}

/// Users, password hashes, roles and external logins.
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Creates a password account. All validation problems are reported together.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AuthResult<User> {
        let mut errors = email_errors(email);
        errors.extend(password_errors(password));
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let user = self.insert(email, name, Some(password.to_string()), false).await?;
        info!("Registered user {}", user.id);
        Ok(user)
    }

    /// Returns the user only if the email exists, has a password and it verifies.
    pub async fn check_password(&self, email: &str, password: &str) -> AuthResult<Option<User>> {
        let normalized = normalize_email(email);
        let password = password.to_string();

        let row = blocking(&self.db, move |db| {
            let Some(row) = db.get_user_by_normalized_email(&normalized)? else {
                return Ok(None);
            };
            let verified = row
                .password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(hash, &password));
            Ok(verified.then_some(row))
        })
        .await?;

        if row.is_none() {
            debug!("Password check failed");
        }
        Ok(row.map(into_user))
    }

    pub async fn find_by_id(&self, user_id: i64) -> AuthResult<Option<User>> {
        let row = blocking(&self.db, move |db| db.get_user_by_id(user_id)).await?;
        Ok(row.map(into_user))
    }

    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let normalized = normalize_email(email);
        let row = blocking(&self.db, move |db| db.get_user_by_normalized_email(&normalized)).await?;
        Ok(row.map(into_user))
    }

    pub async fn roles(&self, user_id: i64) -> AuthResult<Vec<String>> {
        blocking(&self.db, move |db| db.get_user_roles(user_id)).await
    }

    pub async fn find_by_login(&self, provider: &str, subject: &str) -> AuthResult<Option<User>> {
        let provider = provider.to_string();
        let subject = subject.to_string();
        let row = blocking(&self.db, move |db| db.find_user_by_login(&provider, &subject)).await?;
        Ok(row.map(into_user))
    }

    /// Creates a user without a password, as done for federated sign-ins.
    pub async fn create_external(
        &self,
        email: &str,
        name: Option<&str>,
        email_confirmed: bool,
    ) -> AuthResult<User> {
        let errors = email_errors(email);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        self.insert(email, name, None, email_confirmed).await
    }

    async fn insert(
        &self,
        email: &str,
        name: Option<&str>,
        password: Option<String>,
        email_confirmed: bool,
    ) -> AuthResult<User> {
        let trimmed = email.trim().to_string();
        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let normalized = normalize_email(&trimmed);

        let email = trimmed.clone();
        let row = blocking(&self.db, move |db| {
            let password_hash = password.as_deref().map(hash_password).transpose()?;
            let id = db.create_user(&NewUser {
                email: &email,
                normalized_email: &normalized,
                name: name.as_deref(),
                password_hash: password_hash.as_deref(),
                email_confirmed,
                created_at: Utc::now(),
            })?;

            match id {
                Some(id) => db.get_user_by_id(id),
                None => Ok(None),
            }
        })
        .await?;

        row.map(into_user).ok_or_else(|| {
            AuthError::validation(format!("Email '{}' is already taken.", trimmed))
        })
    }

    pub async fn set_name(&self, user_id: i64, name: &str) -> AuthResult<()> {
        let name = name.trim().to_string();
        let updated = blocking(&self.db, move |db| db.set_user_name(user_id, &name)).await?;
        if !updated {
            return Err(AuthError::NotFound("User not found.".to_string()));
        }
        Ok(())
    }

    pub async fn set_password(&self, user_id: i64, password: &str) -> AuthResult<()> {
        let errors = password_errors(password);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let password = password.to_string();
        let updated = blocking(&self.db, move |db| {
            let hash = hash_password(&password)?;
            db.set_password_hash(user_id, &hash)
        })
        .await?;
        if !updated {
            return Err(AuthError::NotFound("User not found.".to_string()));
        }
        Ok(())
    }

    /// Links an external identity to the user. A pair that is already linked is
    /// refused, even when it points at this same user.
    pub async fn add_login(&self, user_id: i64, provider: &str, subject: &str) -> AuthResult<()> {
        let provider = provider.to_string();
        let subject = subject.to_string();
        let linked = blocking(&self.db, move |db| {
            db.add_user_login(user_id, &provider, &subject)
        })
        .await?;
        if !linked {
            return Err(AuthError::validation("A user with this login already exists."));
        }
        Ok(())
    }
}
