#![doc = include_str!("../README.md")]

pub mod authenticator;
pub mod clock;
pub mod codec;
pub mod config;
mod cookies;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod id;
pub mod repository;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use authenticator::{
    Authenticator, AuthenticatorService, BearerTokenAuthenticator,
    BearerTokenAuthenticatorService, CookieAuthenticator, CookieAuthenticatorService,
    SessionAuthenticator, SessionAuthenticatorService, Touched,
};
#[cfg(feature = "jwt")]
pub use authenticator::{JwtAuthenticator, JwtAuthenticatorService};
pub use clock::{Clock, SystemClock};
#[cfg(feature = "jwt")]
pub use codec::JwtCodec;
pub use codec::{AuthenticatorCodec, SignedJsonCodec};
pub use config::{
    BearerTokenAuthenticatorSettings, CookieAuthenticatorSettings, CsrfStateSettings,
    JwtAuthenticatorSettings, SessionAuthenticatorSettings,
};
pub use crypto::{Base64Crypter, ChaChaCrypter, Crypter, HmacSigner, Signer};
pub use error::{AuthenticatorError, BoxError, CodecError, ConfigError, Phase, StateError};
pub use fingerprint::{DefaultFingerprintGenerator, FingerprintGenerator};
pub use http::{AuthRequest, AuthResponse, RequestPart, SessionChanges, SessionData};
pub use id::{IdGenerator, SecureRandomIdGenerator};
pub use repository::{AuthenticatorRepository, InMemoryAuthenticatorRepository};
pub use state::{
    CsrfStateItem, CsrfStateItemHandler, ItemStructure, PublishableStateItemHandler,
    SocialState, SocialStateHandler, StateItem, StateItemHandler, UserStateItemHandler,
};
pub use types::{AuthenticatorId, LoginInfo};
