use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CodecError, ConfigError};

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "1";
const DEFAULT_PEPPER: &str = "-authwright-signer-";

/// Minimum signing key length (32 bytes = 256 bits for HMAC-SHA256).
pub const MIN_KEY_LENGTH: usize = 32;

/// Message-authentication signer.
pub trait Signer: Send + Sync {
    /// Signs `data`, returning a self-describing signed message.
    fn sign(&self, data: &str) -> String;

    /// Verifies a signed message and returns the original data.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSignature`] if the message is malformed or
    /// its signature does not match.
    fn extract(&self, message: &str) -> Result<String, CodecError>;
}

/// HMAC-SHA256 signer.
///
/// Wire format: `1-<hex mac>-<nonce>-<data>`. The MAC covers the nonce and
/// the data, wrapped in a pepper. The nonce makes two signatures of the same
/// data differ.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
    pepper: String,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("key", &"[REDACTED]")
            .field("pepper", &self.pepper)
            .finish()
    }
}

impl HmacSigner {
    /// Create a signer from a secret key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the key is shorter than [`MIN_KEY_LENGTH`].
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let key = key.as_ref();
        if key.len() < MIN_KEY_LENGTH {
            return Err(ConfigError(format!(
                "signing key too short: expected at least {MIN_KEY_LENGTH} bytes, got {}",
                key.len()
            )));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| ConfigError(format!("invalid signing key: {e}")))?;
        Ok(Self {
            mac,
            pepper: DEFAULT_PEPPER.into(),
        })
    }

    /// Override the pepper mixed into every MAC.
    #[must_use]
    pub fn with_pepper(mut self, pepper: impl Into<String>) -> Self {
        self.pepper = pepper.into();
        self
    }

    fn compute(&self, nonce: &str, data: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(self.pepper.as_bytes());
        mac.update(nonce.as_bytes());
        mac.update(b"-");
        mac.update(data.as_bytes());
        mac.update(self.pepper.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Signer for HmacSigner {
    fn sign(&self, data: &str) -> String {
        let nonce: [u8; 16] = rand::rng().random();
        let nonce = hex::encode(nonce);
        let signature = self.compute(&nonce, data);
        format!("{VERSION}-{signature}-{nonce}-{data}")
    }

    fn extract(&self, message: &str) -> Result<String, CodecError> {
        let mut parts = message.splitn(4, '-');
        let (Some(version), Some(signature), Some(nonce), Some(data)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::InvalidSignature);
        };
        if version != VERSION {
            return Err(CodecError::InvalidSignature);
        }

        let expected = self.compute(nonce, data);
        if expected.len() != signature.len()
            || !bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
        {
            return Err(CodecError::InvalidSignature);
        }
        Ok(data.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn signer() -> HmacSigner {
        HmacSigner::new(KEY).unwrap()
    }

    #[test]
    fn sign_and_extract() {
        let signer = signer();
        let signed = signer.sign("payload-with-dashes");
        assert!(signed.starts_with("1-"));
        assert_eq!(signer.extract(&signed).unwrap(), "payload-with-dashes");
    }

    #[test]
    fn empty_payload_round_trips() {
        let signer = signer();
        assert_eq!(signer.extract(&signer.sign("")).unwrap(), "");
    }

    #[test]
    fn signatures_are_nonced() {
        let signer = signer();
        assert_ne!(signer.sign("same"), signer.sign("same"));
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let signer = signer();
        let signed = signer.sign("user-state.csrf-state");
        for i in 0..signed.len() {
            let mut bytes = signed.clone().into_bytes();
            bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                signer.extract(&tampered),
                Err(CodecError::InvalidSignature),
                "byte {i} flipped"
            );
        }
    }

    #[test]
    fn other_key_is_rejected() {
        let other = HmacSigner::new(b"fedcba9876543210fedcba9876543210").unwrap();
        let signed = signer().sign("data");
        assert_eq!(other.extract(&signed), Err(CodecError::InvalidSignature));
    }

    #[test]
    fn other_pepper_is_rejected() {
        let signed = signer().sign("data");
        let other = signer().with_pepper("-other-");
        assert_eq!(other.extract(&signed), Err(CodecError::InvalidSignature));
    }

    #[test]
    fn malformed_messages_are_rejected() {
        let signer = signer();
        for message in ["", "1", "1-abc", "2-abc-def-data", "not a signed value"] {
            assert_eq!(signer.extract(message), Err(CodecError::InvalidSignature));
        }
    }

    #[test]
    fn short_key_is_refused() {
        assert!(HmacSigner::new(b"short").is_err());
    }
}
