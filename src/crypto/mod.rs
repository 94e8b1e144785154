/// Cryptographic primitives: symmetric string encryption and TOTP
pub mod totp;

use crate::error::{GateError, GateResult};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Symmetric cipher for opaque strings: OTP secrets at rest and the
/// outer layer of signed-link tokens.
///
/// Keyed by a single process-wide secret; rotating the key invalidates
/// every previously encrypted value.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt a string, producing `base64url(nonce || ciphertext || tag)`.
    pub fn encrypt(&self, plaintext: &str) -> GateResult<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| GateError::Internal(format!("AES-GCM encrypt: {}", e)))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a string produced by [`encrypt`](Self::encrypt).
    ///
    /// Any failure (bad encoding, truncated buffer, AEAD mismatch)
    /// collapses into `InvalidCiphertext`: the token was not produced
    /// by us.
    pub fn decrypt(&self, token: &str) -> GateResult<String> {
        let combined = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| GateError::InvalidCiphertext)?;

        if combined.len() < 13 {
            return Err(GateError::InvalidCiphertext);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| GateError::InvalidCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| GateError::InvalidCiphertext)
    }
}
