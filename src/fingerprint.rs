//! Client fingerprints binding an authenticator to the device that
//! obtained it.

use axum::http::header::{ACCEPT_CHARSET, ACCEPT_LANGUAGE, USER_AGENT};
use sha2::{Digest, Sha256};

use crate::http::AuthRequest;

/// Derives a fingerprint from request metadata.
///
/// A stolen authenticator replayed from a different client produces a
/// different fingerprint and is rejected on retrieval.
pub trait FingerprintGenerator: Send + Sync {
    fn generate(&self, request: &AuthRequest) -> String;
}

/// SHA-256 over `User-Agent`, `Accept-Language` and `Accept-Charset`,
/// optionally mixed with the client address.
///
/// Including the address breaks authenticators for mobile clients whose
/// IP changes between requests, so it is off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFingerprintGenerator {
    include_remote_address: bool,
}

impl DefaultFingerprintGenerator {
    #[must_use]
    pub fn new(include_remote_address: bool) -> Self {
        Self {
            include_remote_address,
        }
    }
}

impl FingerprintGenerator for DefaultFingerprintGenerator {
    fn generate(&self, request: &AuthRequest) -> String {
        let mut hasher = Sha256::new();
        for header in [USER_AGENT, ACCEPT_LANGUAGE, ACCEPT_CHARSET] {
            hasher.update(request.header(header).unwrap_or_default().as_bytes());
            hasher.update(b":");
        }
        if self.include_remote_address {
            hasher.update(request.client_ip().unwrap_or_default().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
