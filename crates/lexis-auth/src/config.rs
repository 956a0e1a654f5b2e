use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::AuthError;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const MIN_KEY_BYTES: usize = 32;

/// One year.
const MAX_ACCESS_TOKEN_MINUTES: i64 = 525_600;
/// Ten years.
const MAX_REFRESH_TOKEN_DAYS: i64 = 3_650;
/// One day.
const MAX_RESET_CODE_MINUTES: i64 = 1_440;

#[derive(Debug, Clone)]
pub struct JwtOptions {
    pub key: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

impl JwtOptions {
    pub fn access_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_minutes.clamp(1, MAX_ACCESS_TOKEN_MINUTES))
    }

    pub fn refresh_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_days.clamp(1, MAX_REFRESH_TOKEN_DAYS))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GoogleOptions {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_uri: String,
    pub certs_uri: String,
}

impl GoogleOptions {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.token_uri.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtOptions,
    pub google: GoogleOptions,
    /// Upper bound for calls to identity providers.
    pub http_timeout: Duration,
    pub reset_code_minutes: i64,
}

impl AuthConfig {
    pub fn reset_code_lifetime(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reset_code_minutes.clamp(1, MAX_RESET_CODE_MINUTES))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let number = |name: &str, default: i64| -> Result<i64> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be an integer, got '{}'", name, raw)),
                None => Ok(default),
            }
        };

        Ok(Self {
            jwt: JwtOptions {
                key: text("LEXIS_JWT_KEY", ""),
                issuer: text("LEXIS_JWT_ISSUER", "lexis"),
                audience: text("LEXIS_JWT_AUDIENCE", "lexis-clients"),
                access_token_minutes: number("LEXIS_ACCESS_TOKEN_MINUTES", 15)?,
                refresh_token_days: number("LEXIS_REFRESH_TOKEN_DAYS", 30)?,
            },
            google: GoogleOptions {
                client_id: text("LEXIS_GOOGLE_CLIENT_ID", ""),
                client_secret: text("LEXIS_GOOGLE_CLIENT_SECRET", ""),
                redirect_uri: text("LEXIS_GOOGLE_REDIRECT_URI", ""),
                token_uri: text("LEXIS_GOOGLE_TOKEN_URI", "https://oauth2.googleapis.com/token"),
                certs_uri: text(
                    "LEXIS_GOOGLE_CERTS_URI",
                    "https://www.googleapis.com/oauth2/v3/certs",
                ),
            },
            http_timeout: Duration::from_secs(
                number("LEXIS_HTTP_TIMEOUT_SECS", 15)?.max(1) as u64,
            ),
            reset_code_minutes: number("LEXIS_RESET_CODE_MINUTES", 15)?.max(1),
        })
    }

    /// Startup check. A server must not come up with an unusable signing key
    /// or with lifetimes that cannot be added to a timestamp.
    pub fn validate(&self) -> Result<(), AuthError> {
        let key = self.jwt.key.trim();
        if key.is_empty() || PLACEHOLDER_SECRETS.contains(&key) {
            return Err(AuthError::Configuration(
                "LEXIS_JWT_KEY is unset or still a placeholder.".to_string(),
            ));
        }
        if key.len() < MIN_KEY_BYTES {
            return Err(AuthError::Configuration(format!(
                "LEXIS_JWT_KEY must be at least {} bytes.",
                MIN_KEY_BYTES
            )));
        }
        if self.jwt.issuer.trim().is_empty() || self.jwt.audience.trim().is_empty() {
            return Err(AuthError::Configuration(
                "JWT issuer and audience must be set.".to_string(),
            ));
        }
        check_range(
            "LEXIS_ACCESS_TOKEN_MINUTES",
            self.jwt.access_token_minutes,
            MAX_ACCESS_TOKEN_MINUTES,
        )?;
        check_range(
            "LEXIS_REFRESH_TOKEN_DAYS",
            self.jwt.refresh_token_days,
            MAX_REFRESH_TOKEN_DAYS,
        )?;
        check_range(
            "LEXIS_RESET_CODE_MINUTES",
            self.reset_code_minutes,
            MAX_RESET_CODE_MINUTES,
        )?;
        Ok(())
    }
}

fn check_range(name: &str, value: i64, max: i64) -> Result<(), AuthError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(AuthError::Configuration(format!(
            "{} must be between 1 and {}, got {}.",
            name, max, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AuthConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.jwt.issuer, "lexis");
        assert_eq!(config.jwt.access_token_minutes, 15);
        assert_eq!(config.google.token_uri, "https://oauth2.googleapis.com/token");
        assert!(!config.google.is_configured());
        assert_eq!(config.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn lifetimes_are_floored() {
        let config = config_from(&[
            ("LEXIS_ACCESS_TOKEN_MINUTES", "0"),
            ("LEXIS_REFRESH_TOKEN_DAYS", "-3"),
        ])
        .unwrap();
        assert_eq!(config.jwt.access_token_lifetime(), chrono::Duration::minutes(1));
        assert_eq!(config.jwt.refresh_token_lifetime(), chrono::Duration::days(1));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = config_from(&[("LEXIS_REFRESH_TOKEN_DAYS", "thirty")]).unwrap_err();
        assert!(err.to_string().contains("LEXIS_REFRESH_TOKEN_DAYS"));
    }

    #[test]
    fn validate_rejects_missing_and_placeholder_keys() {
        assert!(config_from(&[]).unwrap().validate().is_err());
        assert!(
            config_from(&[("LEXIS_JWT_KEY", "dev-secret-change-me")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[("LEXIS_JWT_KEY", "short")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[("LEXIS_JWT_KEY", "0123456789abcdef0123456789abcdef")])
                .unwrap()
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn validate_rejects_out_of_range_lifetimes() {
        const KEY: (&str, &str) = ("LEXIS_JWT_KEY", "0123456789abcdef0123456789abcdef");

        let config = config_from(&[KEY, ("LEXIS_REFRESH_TOKEN_DAYS", "1000000000")]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.messages()[0].contains("LEXIS_REFRESH_TOKEN_DAYS"));
        assert_eq!(config.jwt.refresh_token_lifetime(), chrono::Duration::days(3_650));

        let config =
            config_from(&[KEY, ("LEXIS_ACCESS_TOKEN_MINUTES", "9223372036854775807")]).unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.jwt.access_token_lifetime(), chrono::Duration::minutes(525_600));

        for (name, value) in [
            ("LEXIS_ACCESS_TOKEN_MINUTES", "0"),
            ("LEXIS_RESET_CODE_MINUTES", "100000"),
        ] {
            assert!(config_from(&[KEY, (name, value)]).unwrap().validate().is_err());
        }
        assert!(
            config_from(&[
                KEY,
                ("LEXIS_ACCESS_TOKEN_MINUTES", "525600"),
                ("LEXIS_REFRESH_TOKEN_DAYS", "3650"),
            ])
            .unwrap()
            .validate()
            .is_ok()
        );
    }
}
