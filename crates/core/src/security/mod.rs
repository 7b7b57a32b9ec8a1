//! Per-job credential cipher.
//!
//! Every job owns a random 256-bit session key. Serialized `AuthData` is
//! sealed with XSalsa20-Poly1305 under that key; the ciphertext layout is
//! `base64url(nonce || sealed)` with a fresh 24-byte nonce per message.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::domain::AuthData;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 24;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("session key is not valid base64url")]
    KeyEncoding,
    #[error("session key must be 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("ciphertext is malformed")]
    MalformedCiphertext,
    #[error("failed to encrypt payload")]
    Encrypt,
    #[error("failed to decrypt payload (wrong key or tampered data)")]
    Decrypt,
    #[error("decrypted payload is not valid UTF-8")]
    InvalidPlaintext,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Symmetric key scoped to a single job
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LENGTH]);

impl SessionKey {
    /// Generates a new random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut buf = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut buf);
        Self(buf)
    }

    /// Parses base64url key material as stored on the job
    pub fn parse(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|_| CryptoError::KeyEncoding)?;
        let key: [u8; KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(Key::from_slice(&self.0))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let raw = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        if raw.len() <= NONCE_LENGTH {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LENGTH);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidPlaintext)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Serializes and seals auth data with the job's session key
pub fn encrypt_auth_data(key: &SessionKey, auth_data: &AuthData) -> crate::Result<String> {
    let serialized = serde_json::to_string(auth_data)?;
    Ok(key.encrypt(&serialized)?)
}

/// Opens and deserializes auth data sealed by [`encrypt_auth_data`]
pub fn decrypt_auth_data(key: &SessionKey, ciphertext: &str) -> crate::Result<AuthData> {
    let serialized = key.decrypt(ciphertext)?;
    Ok(serde_json::from_str(&serialized)?)
}
