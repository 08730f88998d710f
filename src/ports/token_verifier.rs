//! Token verification port.
//!
//! Defines the contract for validating provider-issued access tokens and
//! turning them into typed claims. The JWKS-backed adapter is the production
//! implementation; tests use a table-driven mock.
//!
//! # Security Requirements
//!
//! All implementations MUST validate:
//! - **Signature**: against a currently published key, asymmetric algorithm only
//! - **Issuer (iss)**: HTTPS and an allow-listed host
//! - **Audience (aud)**: must include the configured client id
//! - **Expiry (exp)**: `exp <= now` is expired

use async_trait::async_trait;

use crate::domain::session::{TokenClaims, TokenError};

/// Validates access tokens and extracts typed claims.
///
/// # Contract
///
/// Implementations must:
/// - Return `TokenError::Empty` for blank input
/// - Return `TokenError::Expired(claims)` for a token that is valid in every
///   respect except expiry, so callers can decide to refresh
/// - Return `TokenError::KeysUnavailable` when keys cannot be fetched
/// - Report every other failure as its own distinct variant
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw access token (no "Bearer " prefix).
    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}
