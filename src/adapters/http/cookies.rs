//! Session cookie transport.
//!
//! | Cookie          | Value                                  | SameSite | Max-Age                  |
//! |-----------------|----------------------------------------|----------|--------------------------|
//! | `access_token`  | raw access token                       | Strict   | until `exp`, floor 1h    |
//! | `session_state` | sealed `{refresh_token, session_id}`   | Lax      | `session_max_age_secs`   |
//! | `oauth_state`   | sealed `{redirect, nonce}`             | Lax      | 10 minutes               |
//!
//! All are HttpOnly on path `/`; `Secure` is set in production.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use cookie::time::{Duration, OffsetDateTime};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::adapters::auth::{CodecError, SealedCookieCodec};
use crate::application::EstablishedSession;
use crate::config::AppConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::session::{AuthError, SessionBundle};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const SESSION_STATE_COOKIE: &str = "session_state";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// State carried through an OAuth round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub redirect: Option<String>,
    pub nonce: String,
}

impl OAuthState {
    pub fn new(redirect: Option<String>) -> Self {
        Self {
            redirect,
            nonce: Uuid::new_v4().to_string(),
        }
    }
}

/// Issues, reads and clears the auth cookies.
#[derive(Clone)]
pub struct SessionCookies {
    codec: Arc<SealedCookieCodec>,
    secure: bool,
    session_max_age_secs: i64,
    access_token_floor_secs: i64,
}

impl SessionCookies {
    pub fn new(
        codec: Arc<SealedCookieCodec>,
        secure: bool,
        session_max_age_secs: i64,
        access_token_floor_secs: i64,
    ) -> Self {
        Self {
            codec,
            secure,
            session_max_age_secs,
            access_token_floor_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(SealedCookieCodec::new(&config.session.cookie_secret)),
            config.secure_cookies(),
            config.session.session_max_age_secs,
            config.session.access_token_floor_secs,
        )
    }

    // ════════════════════════════════════════════════════════════════════════
    // Session cookies
    // ════════════════════════════════════════════════════════════════════════

    /// Add both session cookies for a freshly established session.
    pub fn set_session(
        &self,
        jar: CookieJar,
        session: &EstablishedSession,
    ) -> Result<CookieJar, AuthError> {
        let bundle = session.bundle()?;
        let state = self.session_cookie(&bundle).map_err(|e| {
            AuthError::internal(format!("Failed to seal session state: {}", e))
        })?;
        let access = self.access_cookie(
            &session.access_token,
            session.claims.expires_at,
            Timestamp::now().as_unix_secs(),
        );
        Ok(jar.add(access).add(state))
    }

    /// Max-age is the time left until `expires_at`, or the floor when the
    /// token is already expired or has no usable expiry.
    pub fn access_cookie(&self, token: &str, expires_at: i64, now: i64) -> Cookie<'static> {
        let remaining = expires_at - now;
        let mut cookie = self.base_cookie(ACCESS_TOKEN_COOKIE, token.to_string());
        cookie.set_same_site(SameSite::Strict);
        if remaining > 0 {
            cookie.set_max_age(Duration::seconds(remaining));
            if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires_at) {
                cookie.set_expires(expires);
            }
        } else {
            cookie.set_max_age(Duration::seconds(self.access_token_floor_secs));
        }
        cookie
    }

    pub fn session_cookie(&self, bundle: &SessionBundle) -> Result<Cookie<'static>, CodecError> {
        let sealed = self.codec.seal(SESSION_STATE_COOKIE, bundle)?;
        let mut cookie = self.base_cookie(SESSION_STATE_COOKIE, sealed);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(Duration::seconds(self.session_max_age_secs));
        Ok(cookie)
    }

    pub fn access_token(jar: &CookieJar) -> Option<String> {
        jar.get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().trim().to_string())
            .filter(|token| !token.is_empty())
    }

    /// The session bundle, if the cookie is present and opens cleanly.
    pub fn session_bundle(&self, jar: &CookieJar) -> Option<SessionBundle> {
        let sealed = jar.get(SESSION_STATE_COOKIE)?.value().to_string();
        if sealed.is_empty() {
            return None;
        }
        match self.codec.open::<SessionBundle>(SESSION_STATE_COOKIE, &sealed) {
            Ok(bundle) if bundle.validate().is_ok() => Some(bundle),
            Ok(_) => {
                debug!("Session state cookie holds an incomplete bundle");
                None
            }
            Err(e) => {
                debug!(error = %e, "Session state cookie rejected");
                None
            }
        }
    }

    /// Overwrite both session cookies with empty, already-expired values.
    pub fn clear(jar: CookieJar) -> CookieJar {
        jar.add(removal(ACCESS_TOKEN_COOKIE))
            .add(removal(SESSION_STATE_COOKIE))
    }

    // ════════════════════════════════════════════════════════════════════════
    // OAuth state
    // ════════════════════════════════════════════════════════════════════════

    /// Seal the state. The same value goes into the cookie and the
    /// authorization URL.
    pub fn seal_oauth_state(&self, state: &OAuthState) -> Result<(String, Cookie<'static>), CodecError> {
        let sealed = self.codec.seal(OAUTH_STATE_COOKIE, state)?;
        let mut cookie = self.base_cookie(OAUTH_STATE_COOKIE, sealed.clone());
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(Duration::seconds(OAUTH_STATE_MAX_AGE_SECS));
        Ok((sealed, cookie))
    }

    pub fn open_oauth_state(&self, sealed: &str) -> Option<OAuthState> {
        self.codec.open(OAUTH_STATE_COOKIE, sealed).ok()
    }

    /// Compare the callback `state` against the cookie, in constant time.
    ///
    /// Passes when no state cookie was set.
    pub fn oauth_state_matches(jar: &CookieJar, state: Option<&str>) -> bool {
        let Some(expected) = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string()) else {
            return true;
        };
        let Some(state) = state else {
            return false;
        };
        expected.as_bytes().ct_eq(state.as_bytes()).into()
    }

    pub fn clear_oauth_state(jar: CookieJar) -> CookieJar {
        jar.add(removal(OAUTH_STATE_COOKIE))
    }

    fn base_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, value);
        cookie.set_http_only(true);
        cookie.set_secure(self.secure);
        cookie.set_path("/");
        cookie
    }
}

fn removal(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}
