//! Turning authenticators into wire values and back.

#[cfg(feature = "jwt")]
mod jwt;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::authenticator::Authenticator;
use crate::crypto::{Crypter, Signer};
use crate::error::{BoxError, CodecError};
use crate::repository::AuthenticatorRepository;
use crate::types::AuthenticatorId;

#[cfg(feature = "jwt")]
pub use jwt::JwtCodec;

/// `sign(encrypt(json))` and its inverse.
///
/// Decoding checks each layer in turn and reports the first that fails:
/// the signature, then the encoding, then the JSON structure.
#[derive(Clone)]
pub struct SignedJsonCodec {
    signer: Arc<dyn Signer>,
    crypter: Arc<dyn Crypter>,
}

impl std::fmt::Debug for SignedJsonCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedJsonCodec").finish_non_exhaustive()
    }
}

impl SignedJsonCodec {
    #[must_use]
    pub fn new(signer: Arc<dyn Signer>, crypter: Arc<dyn Crypter>) -> Self {
        Self { signer, crypter }
    }

    /// # Errors
    ///
    /// Returns [`CodecError`] if the value cannot be serialized or encoded.
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        let json =
            serde_json::to_string(value).map_err(|e| CodecError::InvalidFormat(e.to_string()))?;
        Ok(self.signer.sign(&self.crypter.encrypt(&json)?))
    }

    /// # Errors
    ///
    /// - [`CodecError::InvalidSignature`] if the value was not signed by a
    ///   matching signer, or was altered
    /// - [`CodecError::InvalidEncoding`] if the signed payload cannot be
    ///   decoded
    /// - [`CodecError::InvalidFormat`] if the decoded JSON has the wrong shape
    pub fn unserialize<T: DeserializeOwned>(&self, raw: &str) -> Result<T, CodecError> {
        let encoded = self.signer.extract(raw)?;
        let json = self.crypter.decrypt(&encoded)?;
        serde_json::from_str(&json).map_err(|e| CodecError::InvalidFormat(e.to_string()))
    }
}

/// Why a carrier value could not be turned back into an authenticator.
#[derive(Debug)]
pub(crate) enum DecodeError {
    /// The value itself is bad. Treated as "not logged in".
    Codec(CodecError),
    /// The store could not be consulted.
    Repository(BoxError),
}

/// How a carrier keeps its authenticators: in a repository, with the ID as
/// the wire value, or entirely inside a signed wire value.
pub enum AuthenticatorCodec<A: Authenticator> {
    StoreBacked(Arc<dyn AuthenticatorRepository<A>>),
    SelfContained(SignedJsonCodec),
}

impl<A: Authenticator> Clone for AuthenticatorCodec<A> {
    fn clone(&self) -> Self {
        match self {
            Self::StoreBacked(repository) => Self::StoreBacked(Arc::clone(repository)),
            Self::SelfContained(codec) => Self::SelfContained(codec.clone()),
        }
    }
}

impl<A: Authenticator> std::fmt::Debug for AuthenticatorCodec<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreBacked(_) => f.write_str("StoreBacked"),
            Self::SelfContained(_) => f.write_str("SelfContained"),
        }
    }
}

impl<A> AuthenticatorCodec<A>
where
    A: Authenticator + Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn store_backed(repository: Arc<dyn AuthenticatorRepository<A>>) -> Self {
        Self::StoreBacked(repository)
    }

    #[must_use]
    pub fn self_contained(signer: Arc<dyn Signer>, crypter: Arc<dyn Crypter>) -> Self {
        Self::SelfContained(SignedJsonCodec::new(signer, crypter))
    }

    pub(crate) async fn decode(&self, raw: &str) -> Result<Option<A>, DecodeError> {
        match self {
            Self::StoreBacked(repository) => repository
                .find(&AuthenticatorId::from(raw))
                .await
                .map_err(DecodeError::Repository),
            Self::SelfContained(codec) => codec.unserialize(raw).map(Some).map_err(DecodeError::Codec),
        }
    }

    /// Persists a new authenticator (store-backed) and returns its wire value.
    pub(crate) async fn encode(&self, authenticator: &A) -> Result<String, BoxError> {
        match self {
            Self::StoreBacked(repository) => {
                let stored = repository.add(authenticator.clone()).await?;
                Ok(stored.id().to_string())
            }
            Self::SelfContained(codec) => Ok(codec.serialize(authenticator)?),
        }
    }

    /// Writes back a touched authenticator. Returns the new wire value when
    /// the value itself changed.
    pub(crate) async fn persist_update(&self, authenticator: &A) -> Result<Option<String>, BoxError> {
        match self {
            Self::StoreBacked(repository) => {
                repository.update(authenticator.clone()).await?;
                Ok(None)
            }
            Self::SelfContained(codec) => Ok(Some(codec.serialize(authenticator)?)),
        }
    }

    /// Self-contained values cannot be revoked server-side; dropping them
    /// from the client is all there is.
    pub(crate) async fn revoke(&self, id: &AuthenticatorId) -> Result<(), BoxError> {
        match self {
            Self::StoreBacked(repository) => repository.remove(id).await,
            Self::SelfContained(_) => Ok(()),
        }
    }
}
