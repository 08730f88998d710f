//! Session cookie configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

const MIN_SECRET_LEN: usize = 16;
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Key material for sealing the session bundle and OAuth state
    pub cookie_secret: Secret<String>,

    /// Frontend origin; redirects are only followed back to this host
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Where to land after login when no valid redirect was requested
    #[serde(default = "default_redirect_path")]
    pub default_redirect_path: String,

    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: i64,

    /// Access cookie lifetime when the token's expiry is already past
    #[serde(default = "default_access_token_floor")]
    pub access_token_floor_secs: i64,
}

impl SessionConfig {
    /// `app_url` without a trailing slash.
    pub fn app_url(&self) -> &str {
        self.app_url.trim_end_matches('/')
    }

    pub fn password_reset_url(&self) -> String {
        format!("{}/auth/password/confirm", self.app_url())
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let min_len = if *environment == Environment::Production {
            MIN_PRODUCTION_SECRET_LEN
        } else {
            MIN_SECRET_LEN
        };
        if self.cookie_secret.expose_secret().len() < min_len {
            return Err(ValidationError::CookieSecretTooShort(min_len));
        }

        let url = url::Url::parse(&self.app_url)
            .map_err(|_| ValidationError::InvalidUrl("SESSION__APP_URL"))?;
        if *environment == Environment::Production && url.scheme() != "https" {
            return Err(ValidationError::MustBeHttps("SESSION__APP_URL"));
        }

        let path = self.default_redirect_path.as_str();
        if !path.starts_with('/') || path.starts_with("//") {
            return Err(ValidationError::InvalidRedirectPath);
        }
        if self.session_max_age_secs <= 0 || self.access_token_floor_secs <= 0 {
            return Err(ValidationError::InvalidSessionLifetime);
        }
        Ok(())
    }
}

fn default_app_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_redirect_path() -> String {
    "/auth/ready".to_string()
}

fn default_session_max_age() -> i64 {
    30 * 24 * 60 * 60
}

fn default_access_token_floor() -> i64 {
    60 * 60
}
