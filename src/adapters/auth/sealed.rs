//! Authenticated encryption for values that round-trip through the client.
//!
//! Session bundles and OAuth state travel in cookies and query strings, so
//! they are sealed with AES-256-GCM. The cookie purpose is bound as
//! associated data: a value sealed for one cookie will not open as another.
//!
//! Wire format: `base64url(nonce[12] || ciphertext+tag)`.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &[u8] = b"-session";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Failed to encode value: {0}")]
    Encode(String),

    /// Tampered, truncated, sealed for another purpose or with another key.
    #[error("Sealed value could not be opened")]
    Invalid,
}

pub struct SealedCookieCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SealedCookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedCookieCodec")
            .field("cipher", &"<redacted>")
            .finish()
    }
}

impl SealedCookieCodec {
    /// Derive the AES key as SHA-256 of the secret plus a fixed context.
    pub fn new(secret: &Secret<String>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.expose_secret().as_bytes());
        hasher.update(KEY_CONTEXT);
        let key = hasher.finalize();
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn seal<T: Serialize>(&self, purpose: &str, value: &T) -> Result<String, CodecError> {
        let plaintext = serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: purpose.as_bytes(),
                },
            )
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    pub fn open<T: DeserializeOwned>(&self, purpose: &str, sealed: &str) -> Result<T, CodecError> {
        let combined = URL_SAFE_NO_PAD
            .decode(sealed.trim().as_bytes())
            .map_err(|_| CodecError::Invalid)?;
        if combined.len() <= NONCE_LEN {
            return Err(CodecError::Invalid);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: purpose.as_bytes(),
                },
            )
            .map_err(|_| CodecError::Invalid)?;

        serde_json::from_slice(&plaintext).map_err(|_| CodecError::Invalid)
    }
}
