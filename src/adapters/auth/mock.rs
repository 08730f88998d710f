//! Mock authentication adapters for testing.
//!
//! These adapters implement the `TokenVerifier` and `IdentityProvider` ports
//! without a network. The mock provider behaves like a small in-memory
//! identity platform: it keeps users, passwords, OAuth codes, refresh tokens
//! and live sessions, and when linked to a [`MockTokenVerifier`] it registers
//! every access token it issues so the verifier accepts it.
//!
//! # Example
//!
//! ```ignore
//! let verifier = Arc::new(MockTokenVerifier::new());
//! let provider = MockIdentityProvider::new()
//!     .with_verifier(verifier.clone())
//!     .with_oauth_code("code-1", MockIdentityProvider::remote_user("user_1", "b@example.com", true));
//!
//! let session = provider.authenticate_with_code("code-1", &RequestMeta::default()).await?;
//! let claims = verifier.verify(&session.access_token).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Map;

use crate::domain::foundation::Timestamp;
use crate::domain::identity::RemoteUser;
use crate::domain::session::{ProviderSession, RequestMeta, TokenClaims, TokenError};
use crate::ports::{
    AuthorizationRequest, IdentityProvider, NewRemoteUser, ProviderError, TokenVerifier,
};

const ACCESS_TOKEN_LIFETIME_SECS: i64 = 300;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ════════════════════════════════════════════════════════════════════════════
// Token verifier
// ════════════════════════════════════════════════════════════════════════════

/// Mock token verifier.
///
/// Maps tokens to a fixed outcome. Unknown tokens fail with
/// `InvalidSignature`.
#[derive(Debug, Default)]
pub struct MockTokenVerifier {
    outcomes: Mutex<HashMap<String, Result<TokenClaims, TokenError>>>,
}

impl MockTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims for a verified user whose token expires at `expires_at`.
    pub fn claims(subject: &str, session_id: &str, expires_at: i64) -> TokenClaims {
        TokenClaims {
            subject: subject.to_string(),
            session_id: Some(session_id.to_string()),
            email: None,
            email_verified: true,
            issued_at: Some(expires_at - ACCESS_TOKEN_LIFETIME_SECS),
            expires_at,
            raw: Map::new(),
        }
    }

    pub fn with_claims(self, token: impl Into<String>, claims: TokenClaims) -> Self {
        self.add_claims(token, claims);
        self
    }

    /// Registers a token that verifies except for having expired.
    pub fn with_expired(self, token: impl Into<String>, claims: TokenClaims) -> Self {
        self.add_expired(token, claims);
        self
    }

    pub fn with_error(self, token: impl Into<String>, error: TokenError) -> Self {
        lock(&self.outcomes).insert(token.into(), Err(error));
        self
    }

    pub fn add_claims(&self, token: impl Into<String>, claims: TokenClaims) {
        lock(&self.outcomes).insert(token.into(), Ok(claims));
    }

    pub fn add_expired(&self, token: impl Into<String>, claims: TokenClaims) {
        lock(&self.outcomes).insert(token.into(), Err(TokenError::Expired(Box::new(claims))));
    }

    pub fn token_count(&self) -> usize {
        lock(&self.outcomes).len()
    }
}

#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        lock(&self.outcomes)
            .get(token)
            .cloned()
            .unwrap_or(Err(TokenError::InvalidSignature))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Identity provider
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ProviderState {
    users: HashMap<String, RemoteUser>,
    passwords: HashMap<String, String>,
    oauth_codes: HashMap<String, String>,
    refresh_tokens: HashMap<String, (String, String)>,
    verification_codes: HashMap<String, String>,
    reset_tokens: HashMap<String, String>,
    sessions: HashSet<String>,
    failures: HashMap<&'static str, ProviderError>,
    calls: Vec<String>,
    counter: u64,
}

impl ProviderState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn fail_if_scripted(&mut self, operation: &'static str) -> Result<(), ProviderError> {
        match self.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn user_id_by_email(&self, email: &str) -> Option<String> {
        self.users
            .values()
            .find(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .map(|user| user.id.clone())
    }
}

/// Mock identity provider for testing.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    state: Mutex<ProviderState>,
    verifier: Option<Arc<MockTokenVerifier>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote profile without names.
    pub fn remote_user(id: &str, email: &str, verified: bool) -> RemoteUser {
        RemoteUser {
            id: id.to_string(),
            email: Some(email.to_string()),
            first_name: None,
            last_name: None,
            email_verified: verified,
            profile_picture_url: None,
            updated_at: Some(Timestamp::now()),
        }
    }

    /// Register issued access tokens with this verifier.
    pub fn with_verifier(mut self, verifier: Arc<MockTokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_user(self, user: RemoteUser, password: Option<&str>) -> Self {
        {
            let mut state = lock(&self.state);
            if let (Some(password), Some(email)) = (password, user.email.as_deref()) {
                state
                    .passwords
                    .insert(email.to_ascii_lowercase(), password.to_string());
            }
            state.users.insert(user.id.clone(), user);
        }
        self
    }

    pub fn with_oauth_code(self, code: impl Into<String>, user: RemoteUser) -> Self {
        {
            let mut state = lock(&self.state);
            state.oauth_codes.insert(code.into(), user.id.clone());
            state.users.insert(user.id.clone(), user);
        }
        self
    }

    /// Makes every call to `operation` fail with `error`.
    pub fn with_failure(self, operation: &'static str, error: ProviderError) -> Self {
        self.fail(operation, error);
        self
    }

    pub fn fail(&self, operation: &'static str, error: ProviderError) {
        lock(&self.state).failures.insert(operation, error);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Issues a refresh token for an existing user outside any grant.
    pub fn issue_refresh_token(&self, user_id: &str, session_id: &str) -> String {
        let mut state = lock(&self.state);
        let n = state.next();
        let token = format!("rt_{}_{}", user_id, n);
        state
            .refresh_tokens
            .insert(token.clone(), (user_id.to_string(), session_id.to_string()));
        state.sessions.insert(session_id.to_string());
        token
    }

    /// Recorded calls, as `operation:argument`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn verification_code(&self, user_id: &str) -> Option<String> {
        lock(&self.state).verification_codes.get(user_id).cloned()
    }

    pub fn reset_token_for(&self, user_id: &str) -> Option<String> {
        lock(&self.state)
            .reset_tokens
            .iter()
            .find(|(_, owner)| owner.as_str() == user_id)
            .map(|(token, _)| token.clone())
    }

    pub fn is_session_live(&self, session_id: &str) -> bool {
        lock(&self.state).sessions.contains(session_id)
    }

    pub fn user(&self, user_id: &str) -> Option<RemoteUser> {
        lock(&self.state).users.get(user_id).cloned()
    }

    fn start_session(
        &self,
        state: &mut ProviderState,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<ProviderSession, ProviderError> {
        let user = state
            .users
            .get(user_id)
            .cloned()
            .ok_or(ProviderError::NotFound)?;
        let n = state.next();
        let session_id = session_id.unwrap_or_else(|| format!("session_{}", n));
        let access_token = format!("at_{}_{}", user_id, n);
        let refresh_token = format!("rt_{}_{}", user_id, n);

        state
            .refresh_tokens
            .insert(refresh_token.clone(), (user_id.to_string(), session_id.clone()));
        state.sessions.insert(session_id.clone());

        if let Some(verifier) = &self.verifier {
            let mut claims = MockTokenVerifier::claims(
                user_id,
                &session_id,
                Timestamp::now().as_unix_secs() + ACCESS_TOKEN_LIFETIME_SECS,
            );
            claims.email = user.email.clone();
            claims.email_verified = user.email_verified;
            verifier.add_claims(access_token.clone(), claims);
        }

        Ok(ProviderSession {
            access_token,
            refresh_token,
            user,
        })
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn name(&self) -> &'static str {
        "workos"
    }

    async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
        _meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("authenticate_with_password:{}", email));
        state.fail_if_scripted("authenticate_with_password")?;

        let key = email.to_ascii_lowercase();
        if state.passwords.get(&key).map(String::as_str) != Some(password) {
            return Err(ProviderError::InvalidCredentials);
        }
        let user_id = state
            .user_id_by_email(&key)
            .ok_or(ProviderError::InvalidCredentials)?;
        if !state.users[&user_id].email_verified {
            return Err(ProviderError::EmailVerificationRequired);
        }
        self.start_session(&mut state, &user_id, None)
    }

    async fn authenticate_with_code(
        &self,
        code: &str,
        _meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("authenticate_with_code:{}", code));
        state.fail_if_scripted("authenticate_with_code")?;

        let user_id = state
            .oauth_codes
            .remove(code)
            .ok_or(ProviderError::InvalidCredentials)?;
        self.start_session(&mut state, &user_id, None)
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        _meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push("authenticate_with_refresh_token".to_string());
        state.fail_if_scripted("authenticate_with_refresh_token")?;

        let (user_id, session_id) = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(ProviderError::InvalidCredentials)?;
        if !state.sessions.contains(&session_id) {
            return Err(ProviderError::InvalidCredentials);
        }
        self.start_session(&mut state, &user_id, Some(session_id))
    }

    async fn revoke_session(&self, session_id: &str) -> Result<(), ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("revoke_session:{}", session_id));
        state.fail_if_scripted("revoke_session")?;

        if !state.sessions.remove(session_id) {
            return Err(ProviderError::InvalidCredentials);
        }
        state
            .refresh_tokens
            .retain(|_, (_, session)| session.as_str() != session_id);
        Ok(())
    }

    async fn create_user(&self, user: &NewRemoteUser) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("create_user:{}", user.email));
        state.fail_if_scripted("create_user")?;

        let email = user.email.to_ascii_lowercase();
        if state.user_id_by_email(&email).is_some() {
            return Err(ProviderError::Conflict);
        }
        let n = state.next();
        let remote = RemoteUser {
            id: format!("user_{}", n),
            email: Some(email.clone()),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email_verified: false,
            profile_picture_url: None,
            updated_at: Some(Timestamp::now()),
        };
        state.passwords.insert(email, user.password.clone());
        state.users.insert(remote.id.clone(), remote.clone());
        Ok(remote)
    }

    async fn send_verification_email(&self, user_id: &str) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("send_verification_email:{}", user_id));
        state.fail_if_scripted("send_verification_email")?;

        let user = state
            .users
            .get(user_id)
            .cloned()
            .ok_or(ProviderError::NotFound)?;
        let n = state.next();
        state
            .verification_codes
            .insert(user_id.to_string(), format!("{:06}", n));
        Ok(user)
    }

    async fn verify_email(&self, user_id: &str, code: &str) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("verify_email:{}", user_id));
        state.fail_if_scripted("verify_email")?;

        if state.verification_codes.get(user_id).map(String::as_str) != Some(code) {
            return Err(ProviderError::InvalidCredentials);
        }
        state.verification_codes.remove(user_id);
        let user = state.users.get_mut(user_id).ok_or(ProviderError::NotFound)?;
        user.email_verified = true;
        user.updated_at = Some(Timestamp::now());
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("get_user:{}", user_id));
        state.fail_if_scripted("get_user")?;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn list_users_by_email(
        &self,
        email: &str,
        limit: u32,
    ) -> Result<Vec<RemoteUser>, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("list_users_by_email:{}", email));
        state.fail_if_scripted("list_users_by_email")?;
        Ok(state
            .users
            .values()
            .filter(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_user_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("update_user_email:{}", user_id));
        state.fail_if_scripted("update_user_email")?;

        if state
            .user_id_by_email(email)
            .is_some_and(|owner| owner != user_id)
        {
            return Err(ProviderError::Conflict);
        }
        let previous = state
            .users
            .get(user_id)
            .and_then(|user| user.email.clone())
            .ok_or(ProviderError::NotFound)?;
        if let Some(password) = state.passwords.remove(&previous) {
            state.passwords.insert(email.to_ascii_lowercase(), password);
        }
        let user = state.users.get_mut(user_id).ok_or(ProviderError::NotFound)?;
        user.email = Some(email.to_ascii_lowercase());
        user.email_verified = false;
        user.updated_at = Some(Timestamp::now());
        Ok(user.clone())
    }

    async fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<(), ProviderError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(format!("send_password_reset:{}:{}", email, reset_url));
        state.fail_if_scripted("send_password_reset")?;

        if let Some(user_id) = state.user_id_by_email(email) {
            let n = state.next();
            state.reset_tokens.insert(format!("reset_{}", n), user_id);
        }
        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<RemoteUser, ProviderError> {
        let mut state = lock(&self.state);
        state.calls.push("reset_password".to_string());
        state.fail_if_scripted("reset_password")?;

        let user_id = state
            .reset_tokens
            .remove(token)
            .ok_or(ProviderError::InvalidCredentials)?;
        let user = state
            .users
            .get(&user_id)
            .cloned()
            .ok_or(ProviderError::NotFound)?;
        if let Some(email) = user.email.as_deref() {
            state
                .passwords
                .insert(email.to_ascii_lowercase(), new_password.to_string());
        }
        Ok(user)
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, ProviderError> {
        let mut url = url::Url::parse("https://auth.mock.test/authorize")
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("redirect_uri", &request.redirect_uri)
            .append_pair("state", &request.state)
            .append_pair(
                "provider",
                request
                    .connection_id
                    .as_deref()
                    .or(request.provider.as_deref())
                    .unwrap_or_default(),
            );
        Ok(url.into())
    }
}
