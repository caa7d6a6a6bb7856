use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

const VERSION_PREFIX: &str = "1-";

/// Reversible value encoder.
///
/// Integrity is the [`Signer`](super::Signer)'s job; a crypter only has to
/// make `decrypt(encrypt(x)) == x`.
pub trait Crypter: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEncoding`] if the value cannot be encoded.
    fn encrypt(&self, plaintext: &str) -> Result<String, CodecError>;

    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEncoding`] if the value was not produced
    /// by a matching crypter.
    fn decrypt(&self, encoded: &str) -> Result<String, CodecError>;
}

/// ChaCha20-Poly1305 crypter.
///
/// The key is SHA-256 of the configured secret, so secrets of any length
/// work. Wire format: `1-<base64url(nonce || ciphertext)>`.
#[derive(Clone)]
pub struct ChaChaCrypter {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for ChaChaCrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaCrypter")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ChaChaCrypter {
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(secret.as_ref());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&digest));
        Self { cipher }
    }
}

impl Crypter for ChaChaCrypter {
    fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        let nonce: [u8; NONCE_SIZE] = rand::rng().random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CodecError::InvalidEncoding(format!("encryption failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{VERSION_PREFIX}{}", URL_SAFE_NO_PAD.encode(payload)))
    }

    fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let body = encoded
            .strip_prefix(VERSION_PREFIX)
            .ok_or_else(|| CodecError::InvalidEncoding("unknown crypter version".into()))?;
        let payload = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| CodecError::InvalidEncoding(e.to_string()))?;
        if payload.len() < NONCE_SIZE {
            return Err(CodecError::InvalidEncoding("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::InvalidEncoding("decryption failed".into()))?;
        String::from_utf8(plaintext).map_err(|e| CodecError::InvalidEncoding(e.to_string()))
    }
}

/// Plain base64url encoding. Provides no confidentiality; use it when the
/// payload may be readable by the client and only signing is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Crypter;

impl Crypter for Base64Crypter {
    fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        Ok(URL_SAFE_NO_PAD.encode(plaintext))
    }

    fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CodecError::InvalidEncoding(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CodecError::InvalidEncoding(e.to_string()))
    }
}
