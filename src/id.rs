use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::BoxError;

/// Source of unique authenticator IDs and CSRF tokens.
pub trait IdGenerator: Send + Sync {
    /// Generates a new unique ID.
    ///
    /// # Errors
    ///
    /// Returns an error if no randomness source is available.
    fn generate(&self) -> Result<String, BoxError>;
}

/// Generates hex-encoded IDs from the operating system RNG.
#[derive(Debug, Clone, Copy)]
pub struct SecureRandomIdGenerator {
    size_in_bytes: usize,
}

impl SecureRandomIdGenerator {
    /// Default entropy: 32 random bytes (64 hex characters).
    pub const DEFAULT_SIZE_IN_BYTES: usize = 32;

    #[must_use]
    pub fn new(size_in_bytes: usize) -> Self {
        Self { size_in_bytes }
    }
}

impl Default for SecureRandomIdGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE_IN_BYTES)
    }
}

impl IdGenerator for SecureRandomIdGenerator {
    fn generate(&self) -> Result<String, BoxError> {
        let mut bytes = vec![0u8; self.size_in_bytes];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| BoxError::from(format!("OS random source unavailable: {e}")))?;
        Ok(hex::encode(bytes))
    }
}
