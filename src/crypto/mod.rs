//! Pluggable primitives for the wire pipeline.
//!
//! A [`Signer`] provides integrity, a [`Crypter`] provides a reversible
//! encoding (optionally confidential). They are composed, never merged, so
//! a carrier can choose signed-only, encrypted-only, or both.

mod crypter;
mod signer;

pub use crypter::{Base64Crypter, ChaChaCrypter, Crypter};
pub use signer::{HmacSigner, Signer};
