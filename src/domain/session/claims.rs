//! Typed access-token claims and token validation errors.

use serde_json::{Map, Value};
use thiserror::Error;

/// Claims extracted from a verified access token.
///
/// Only the token verifier builds this from the raw claim map; everything
/// downstream reads the typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub subject: String,
    pub session_id: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub issued_at: Option<i64>,
    pub expires_at: i64,
    pub raw: Map<String, Value>,
}

impl TokenClaims {
    /// Builds typed claims from a decoded claim map.
    ///
    /// `sub` and `exp` are required. Optional claims that are present must
    /// still have the right type.
    pub fn from_map(raw: Map<String, Value>) -> Result<Self, TokenError> {
        let subject = match raw.get("sub") {
            None | Some(Value::Null) => return Err(TokenError::MissingClaim("sub")),
            Some(Value::String(sub)) if !sub.trim().is_empty() => sub.clone(),
            Some(_) => return Err(TokenError::InvalidClaim("sub")),
        };
        let expires_at = match raw.get("exp") {
            None | Some(Value::Null) => return Err(TokenError::MissingClaim("exp")),
            Some(value) => numeric_date(value, "exp")?,
        };
        let issued_at = match raw.get("iat") {
            None | Some(Value::Null) => None,
            Some(value) => Some(numeric_date(value, "iat")?),
        };

        Ok(Self {
            subject,
            session_id: optional_string(&raw, "sid")?,
            email: optional_string(&raw, "email")?,
            email_verified: optional_bool(&raw, "email_verified")?.unwrap_or(false),
            issued_at,
            expires_at,
            raw,
        })
    }

    /// Expired when `exp <= now`.
    pub fn is_expired_at(&self, now_unix_secs: i64) -> bool {
        self.expires_at <= now_unix_secs
    }
}

fn numeric_date(value: &Value, claim: &'static str) -> Result<i64, TokenError> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                Ok(secs)
            } else {
                match n.as_f64() {
                    Some(secs) if secs.is_finite() && secs.abs() < i64::MAX as f64 => {
                        Ok(secs.floor() as i64)
                    }
                    _ => Err(TokenError::InvalidNumericDate(claim)),
                }
            }
        }
        _ => Err(TokenError::InvalidNumericDate(claim)),
    }
}

fn optional_string(raw: &Map<String, Value>, claim: &'static str) -> Result<Option<String>, TokenError> {
    match raw.get(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TokenError::InvalidClaim(claim)),
    }
}

fn optional_bool(raw: &Map<String, Value>, claim: &'static str) -> Result<Option<bool>, TokenError> {
    match raw.get(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(TokenError::InvalidClaim(claim)),
    }
}

/// Reasons an access token was not accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenError {
    #[error("Token is empty")]
    Empty,

    #[error("Token is malformed")]
    Malformed,

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("No signing key matches the token key id")]
    UnknownKey,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token issuer is not allowed")]
    InvalidIssuer,

    #[error("Token audience does not include this client")]
    InvalidAudience,

    #[error("Token is missing required claim '{0}'")]
    MissingClaim(&'static str),

    #[error("Token claim '{0}' has the wrong type")]
    InvalidClaim(&'static str),

    #[error("Token claim '{0}' is not a valid numeric date")]
    InvalidNumericDate(&'static str),

    /// Signature and claims are valid but `exp` has passed. The parsed
    /// claims are kept so a refresh can be attempted.
    #[error("Token has expired")]
    Expired(Box<TokenClaims>),

    #[error("Signing keys are unavailable")]
    KeysUnavailable,
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired(_))
    }

    /// Claims of an expired token, if that is what this error is.
    pub fn expired_claims(&self) -> Option<&TokenClaims> {
        match self {
            TokenError::Expired(claims) => Some(claims),
            _ => None,
        }
    }

    pub fn into_expired_claims(self) -> Option<TokenClaims> {
        match self {
            TokenError::Expired(claims) => Some(*claims),
            _ => None,
        }
    }
}
