//! WorkOS User Management client.
//!
//! Implements the `IdentityProvider` port over the WorkOS REST API. One
//! client is built at startup from `AuthConfig` and shared; every request
//! uses the same `reqwest::Client`, bounded timeout and bearer API key.
//!
//! Remote status codes are classified into `ProviderError` here and nowhere
//! else, so callers only ever see domain outcomes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::foundation::Timestamp;
use crate::domain::identity::RemoteUser;
use crate::domain::session::{ProviderSession, RequestMeta};
use crate::ports::{AuthorizationRequest, IdentityProvider, NewRemoteUser, ProviderError};

pub const PROVIDER_NAME: &str = "workos";

/// Connection settings for [`WorkosClient`].
#[derive(Debug, Clone)]
pub struct WorkosConfig {
    pub api_base_url: String,
    pub client_id: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

pub struct WorkosClient {
    base_url: String,
    client_id: String,
    api_key: Secret<String>,
    http: reqwest::Client,
}

impl WorkosClient {
    pub fn new(config: WorkosConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id,
            api_key: config.api_key,
            http,
        })
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<url::Url, ProviderError> {
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(ProviderError::NotFound);
        }
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Unavailable(format!("invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Unavailable("API base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ProviderError> {
        let url = self.endpoint(segments)?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(self.api_key.expose_secret()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Unable to contact identity provider");
            ProviderError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_status(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), error = %err, "Identity provider rejected request");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn authenticate(
        &self,
        mut grant: Value,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        grant["client_id"] = json!(self.client_id);
        grant["client_secret"] = json!(self.api_key.expose_secret());
        grant["ip_address"] = json!(meta.ip_address);
        grant["user_agent"] = json!(meta.user_agent);

        let response: WorkosAuthenticateResponse = self
            .send_json(
                self.request(Method::POST, &["user_management", "authenticate"])?
                    .json(&grant),
            )
            .await?;
        response.into_session()
    }
}

impl std::fmt::Debug for WorkosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkosClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for WorkosClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let grant = json!({
            "grant_type": "password",
            "email": email,
            "password": password,
        });
        self.authenticate(grant, meta).await
    }

    async fn authenticate_with_code(
        &self,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let grant = json!({
            "grant_type": "authorization_code",
            "code": code,
        });
        self.authenticate(grant, meta).await
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let grant = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        self.authenticate(grant, meta).await
    }

    async fn revoke_session(&self, session_id: &str) -> Result<(), ProviderError> {
        self.send(
            self.request(Method::POST, &["user_management", "sessions", "revoke"])?
                .json(&json!({ "session_id": session_id })),
        )
        .await?;
        Ok(())
    }

    async fn create_user(&self, user: &NewRemoteUser) -> Result<RemoteUser, ProviderError> {
        let body = json!({
            "email": user.email,
            "password": user.password,
            "first_name": user.first_name,
            "last_name": user.last_name,
        });
        let created: WorkosUser = self
            .send_json(self.request(Method::POST, &["user_management", "users"])?.json(&body))
            .await?;
        created.into_remote()
    }

    async fn send_verification_email(&self, user_id: &str) -> Result<RemoteUser, ProviderError> {
        let path = ["user_management", "users", user_id, "email_verification", "send"];
        let response: WorkosUserEnvelope = self
            .send_json(self.request(Method::POST, &path)?.json(&json!({})))
            .await?;
        response.user.into_remote()
    }

    async fn verify_email(&self, user_id: &str, code: &str) -> Result<RemoteUser, ProviderError> {
        let path = ["user_management", "users", user_id, "email_verification", "confirm"];
        let response: WorkosUserEnvelope = self
            .send_json(self.request(Method::POST, &path)?.json(&json!({ "code": code })))
            .await?;
        response.user.into_remote()
    }

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ProviderError> {
        let path = ["user_management", "users", user_id];
        let user: WorkosUser = self.send_json(self.request(Method::GET, &path)?).await?;
        user.into_remote()
    }

    async fn list_users_by_email(
        &self,
        email: &str,
        limit: u32,
    ) -> Result<Vec<RemoteUser>, ProviderError> {
        let limit = limit.to_string();
        let list: WorkosUserList = self
            .send_json(
                self.request(Method::GET, &["user_management", "users"])?
                    .query(&[("email", email), ("limit", limit.as_str())]),
            )
            .await?;
        list.data.into_iter().map(WorkosUser::into_remote).collect()
    }

    async fn update_user_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<RemoteUser, ProviderError> {
        let path = ["user_management", "users", user_id];
        let user: WorkosUser = self
            .send_json(
                self.request(Method::PUT, &path)?
                    .json(&json!({ "email": email, "email_verified": false })),
            )
            .await?;
        user.into_remote()
    }

    async fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<(), ProviderError> {
        self.send(
            self.request(Method::POST, &["user_management", "password_reset", "send"])?
                .json(&json!({ "email": email, "password_reset_url": reset_url })),
        )
        .await?;
        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<RemoteUser, ProviderError> {
        let response: WorkosUserEnvelope = self
            .send_json(
                self.request(Method::POST, &["user_management", "password_reset", "confirm"])?
                    .json(&json!({ "token": token, "new_password": new_password })),
            )
            .await?;
        response.user.into_remote()
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, ProviderError> {
        let mut url = self.endpoint(&["user_management", "authorize"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("state", &request.state);
            match (&request.connection_id, &request.provider) {
                (Some(connection), _) => {
                    query.append_pair("connection_id", connection);
                }
                (None, Some(provider)) => {
                    query.append_pair("provider", provider);
                }
                (None, None) => {
                    return Err(ProviderError::Rejected {
                        status: 400,
                        detail: "authorization needs a provider or connection".to_string(),
                    })
                }
            }
        }
        Ok(url.into())
    }
}

/// Map a non-success status and body to a `ProviderError`.
pub(crate) fn classify_status(status: u16, body: &str) -> ProviderError {
    match status {
        400 | 401 | 422 => ProviderError::InvalidCredentials,
        403 if mentions_email_verification(body) => ProviderError::EmailVerificationRequired,
        404 => ProviderError::NotFound,
        409 => ProviderError::Conflict,
        429 => ProviderError::RateLimited,
        _ => ProviderError::Rejected {
            status,
            detail: truncate(body, 200),
        },
    }
}

fn mentions_email_verification(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("email_verification_required") || lower.contains("email verification required")
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

fn empty_to_none(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// ════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct WorkosUser {
    id: Option<String>,
    email: Option<String>,
    #[serde(alias = "firstName")]
    first_name: Option<String>,
    #[serde(alias = "lastName")]
    last_name: Option<String>,
    #[serde(default, alias = "emailVerified")]
    email_verified: bool,
    #[serde(alias = "profilePictureUrl")]
    profile_picture_url: Option<String>,
    #[serde(alias = "updatedAt")]
    updated_at: Option<String>,
}

impl WorkosUser {
    fn into_remote(self) -> Result<RemoteUser, ProviderError> {
        let id = empty_to_none(self.id)
            .ok_or_else(|| ProviderError::InvalidResponse("user payload has no id".to_string()))?;
        Ok(RemoteUser {
            id,
            email: empty_to_none(self.email),
            first_name: empty_to_none(self.first_name),
            last_name: empty_to_none(self.last_name),
            email_verified: self.email_verified,
            profile_picture_url: empty_to_none(self.profile_picture_url),
            updated_at: self
                .updated_at
                .as_deref()
                .and_then(Timestamp::parse_rfc3339),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WorkosUserEnvelope {
    user: WorkosUser,
}

#[derive(Debug, Deserialize)]
struct WorkosUserList {
    data: Vec<WorkosUser>,
}

#[derive(Deserialize)]
struct WorkosAuthenticateResponse {
    #[serde(alias = "accessToken")]
    access_token: Option<String>,
    #[serde(alias = "refreshToken")]
    refresh_token: Option<String>,
    user: WorkosUser,
}

impl WorkosAuthenticateResponse {
    fn into_session(self) -> Result<ProviderSession, ProviderError> {
        let access_token = empty_to_none(self.access_token);
        let refresh_token = empty_to_none(self.refresh_token);
        match (access_token, refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(ProviderSession {
                access_token,
                refresh_token,
                user: self.user.into_remote()?,
            }),
            _ => Err(ProviderError::InvalidResponse(
                "authentication response is missing tokens".to_string(),
            )),
        }
    }
}
