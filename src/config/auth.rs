//! Authentication configuration (identity provider and token verification)

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

const PROVIDER_PLACEHOLDER: &str = "{provider}";

/// Which credentials the deployment accepts.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// Email and password only
    Password,
    /// Social login through the authorization-code flow only
    OauthSocial,
    /// Everything the identity provider supports
    #[default]
    DelegatedProvider,
}

/// Identity provider and token verification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Provider client id; also the expected token audience
    pub client_id: String,

    pub api_key: Secret<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Overrides `{api_base_url}/sso/jwks/{client_id}`
    pub jwks_url: Option<String>,

    /// Comma-separated hosts accepted in the `iss` claim
    #[serde(default = "default_allowed_issuer_hosts")]
    pub allowed_issuer_hosts: String,

    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub credential_strategy: CredentialStrategy,

    /// OAuth callback; `{provider}` is replaced with the provider name
    #[serde(default = "default_oauth_redirect_uri")]
    pub oauth_redirect_uri: String,

    pub google_connection_id: Option<String>,

    pub github_connection_id: Option<String>,
}

impl AuthConfig {
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => format!(
                "{}/sso/jwks/{}",
                self.api_base_url.trim_end_matches('/'),
                self.client_id
            ),
        }
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn issuer_hosts(&self) -> Vec<String> {
        self.allowed_issuer_hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_ascii_lowercase)
            .collect()
    }

    pub fn redirect_uri_for(&self, provider: &str) -> String {
        self.oauth_redirect_uri.replace(PROVIDER_PLACEHOLDER, provider)
    }

    /// Configured connection id for a social provider, if any.
    pub fn connection_id_for(&self, provider: &str) -> Option<&str> {
        let id = match provider {
            "google" => self.google_connection_id.as_deref(),
            "github" => self.github_connection_id.as_deref(),
            _ => None,
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__CLIENT_ID"));
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__API_KEY"));
        }
        if self.http_timeout_secs == 0 || self.http_timeout_secs > 30 {
            return Err(ValidationError::InvalidHttpTimeout);
        }
        if self.issuer_hosts().is_empty() {
            return Err(ValidationError::NoIssuerHosts);
        }

        let production = *environment == Environment::Production;
        check_url(&self.api_base_url, "AUTH__API_BASE_URL", production)?;
        check_url(&self.jwks_url(), "AUTH__JWKS_URL", production)?;
        check_url(
            &self.redirect_uri_for("google"),
            "AUTH__OAUTH_REDIRECT_URI",
            production,
        )?;
        Ok(())
    }
}

fn check_url(raw: &str, name: &'static str, require_https: bool) -> Result<(), ValidationError> {
    let url = url::Url::parse(raw).map_err(|_| ValidationError::InvalidUrl(name))?;
    if require_https && url.scheme() != "https" {
        return Err(ValidationError::MustBeHttps(name));
    }
    Ok(())
}

fn default_api_base_url() -> String {
    "https://api.workos.com".to_string()
}

fn default_allowed_issuer_hosts() -> String {
    "api.workos.com,auth.workos.com".to_string()
}

fn default_jwks_cache_ttl() -> u64 {
    3600
}

fn default_http_timeout() -> u64 {
    5
}

fn default_oauth_redirect_uri() -> String {
    "http://localhost:8080/auth/{provider}/callback".to_string()
}
