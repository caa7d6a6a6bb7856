//! Deterministic stand-ins for the injected collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderValue;
use time::{Duration, OffsetDateTime};

use crate::authenticator::{Authenticator, BearerTokenAuthenticator};
use crate::clock::Clock;
use crate::crypto::{HmacSigner, Signer};
use crate::error::BoxError;
use crate::fingerprint::FingerprintGenerator;
use crate::http::AuthRequest;
use crate::id::IdGenerator;
use crate::repository::AuthenticatorRepository;
use crate::types::{AuthenticatorId, LoginInfo};

pub(crate) const FINGERPRINT_HEADER: &str = "x-test-fingerprint";

const EPOCH_SECS: i64 = 1_700_000_000;

/// `T0 + secs`, on a whole second.
pub(crate) fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(EPOCH_SECS).unwrap() + Duration::seconds(secs)
}

pub(crate) fn login() -> LoginInfo {
    LoginInfo::new("credentials", "alice@example.com")
}

pub(crate) fn test_signer() -> Arc<dyn Signer> {
    Arc::new(HmacSigner::new(b"0123456789abcdef0123456789abcdef").unwrap())
}

/// Request whose fingerprint (under [`HeaderFingerprintGenerator`]) is
/// `fingerprint`.
pub(crate) fn request_from(fingerprint: &str) -> AuthRequest {
    AuthRequest::default()
        .with_header_value(FINGERPRINT_HEADER, HeaderValue::from_str(fingerprint).unwrap())
}

/// Bearer authenticator issued at `T0`, expiring an hour later.
pub(crate) fn bearer_authenticator(id: &str) -> BearerTokenAuthenticator {
    BearerTokenAuthenticator {
        id: id.into(),
        login_info: login(),
        last_used_at: at(0),
        expires_at: at(3600),
        idle_timeout: None,
    }
}

#[derive(Debug)]
pub(crate) struct MockClock(Mutex<OffsetDateTime>);

impl MockClock {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self(Mutex::new(now))
    }

    pub(crate) fn set(&self, now: OffsetDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for MockClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}

/// Uses the raw value of [`FINGERPRINT_HEADER`] as the fingerprint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderFingerprintGenerator;

impl FingerprintGenerator for HeaderFingerprintGenerator {
    fn generate(&self, request: &AuthRequest) -> String {
        request.header(FINGERPRINT_HEADER).unwrap_or_default().to_owned()
    }
}

/// `id-1`, `id-2`, ...
#[derive(Debug, Default)]
pub(crate) struct SequenceIdGenerator(AtomicUsize);

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self) -> Result<String, BoxError> {
        Ok(format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FailingIdGenerator;

impl IdGenerator for FailingIdGenerator {
    fn generate(&self) -> Result<String, BoxError> {
        Err("entropy source unavailable".into())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FailingRepository;

#[async_trait]
impl<A: Authenticator> AuthenticatorRepository<A> for FailingRepository {
    async fn find(&self, _id: &AuthenticatorId) -> Result<Option<A>, BoxError> {
        Err("store unreachable".into())
    }

    async fn add(&self, _authenticator: A) -> Result<A, BoxError> {
        Err("store unreachable".into())
    }

    async fn update(&self, _authenticator: A) -> Result<A, BoxError> {
        Err("store unreachable".into())
    }

    async fn remove(&self, _id: &AuthenticatorId) -> Result<(), BoxError> {
        Err("store unreachable".into())
    }
}
