//! Authenticator model and the lifecycle every carrier implements.
//!
//! A request flows through the lifecycle like this:
//!
//! ```rust,ignore
//! // login
//! let authenticator = service.create(login_info, &request).await?;
//! let value = service.init(&authenticator).await?;
//! let response = service.embed(value, AuthResponse::new())?;
//!
//! // every later request
//! if let Some(authenticator) = service.retrieve(&request).await? {
//!     let touched = service.touch(authenticator);
//!     let response = service.update_touched(touched, response).await?;
//! }
//!
//! // logout
//! let response = service.discard(authenticator, response).await?;
//! ```

mod bearer;
mod cookie;
#[cfg(feature = "jwt")]
mod jwt;
mod session;

use std::fmt::Debug;
use std::future::Future;

use time::{Duration, OffsetDateTime};

use crate::codec::DecodeError;
use crate::error::AuthenticatorError;
use crate::http::{AuthRequest, AuthResponse};
use crate::types::{AuthenticatorId, LoginInfo};

pub use bearer::{BearerTokenAuthenticator, BearerTokenAuthenticatorService};
pub use cookie::{CookieAuthenticator, CookieAuthenticatorService};
#[cfg(feature = "jwt")]
pub use jwt::{JwtAuthenticator, JwtAuthenticatorService};
pub use session::{SessionAuthenticator, SessionAuthenticatorService};

/// Common shape of every carrier's authenticator.
pub trait Authenticator: Clone + Debug + Send + Sync + 'static {
    fn id(&self) -> &AuthenticatorId;

    fn login_info(&self) -> &LoginInfo;

    fn last_used_at(&self) -> OffsetDateTime;

    fn expires_at(&self) -> OffsetDateTime;

    fn idle_timeout(&self) -> Option<Duration>;

    /// Copy with a new last-used timestamp. The only mutation a touch makes.
    #[must_use]
    fn with_last_used_at(self, at: OffsetDateTime) -> Self;

    /// Valid until the absolute expiry, and, with an idle timeout, until
    /// the authenticator has been unused for longer than the timeout.
    fn is_valid(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at()
            && self
                .idle_timeout()
                .is_none_or(|idle| now - self.last_used_at() <= idle)
    }
}

/// Outcome of [`touch`]. Callers skip the write-back on `Unchanged`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Touched<A> {
    Changed(A),
    Unchanged(A),
}

impl<A> Touched<A> {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    #[must_use]
    pub fn into_inner(self) -> A {
        match self {
            Self::Changed(a) | Self::Unchanged(a) => a,
        }
    }
}

/// Bumps `last_used_at` when the authenticator has an idle timeout.
///
/// Without one there is nothing to slide, so the authenticator comes back
/// untouched.
pub fn touch<A: Authenticator>(authenticator: A, now: OffsetDateTime) -> Touched<A> {
    if authenticator.idle_timeout().is_some() {
        Touched::Changed(authenticator.with_last_used_at(now))
    } else {
        Touched::Unchanged(authenticator)
    }
}

/// Lifecycle of one carrier.
///
/// Every fallible operation reports an [`AuthenticatorError`] qualified by
/// [`ID`](Self::ID) and the failing phase. Retrieval is the exception for
/// undecodable values: those are logged and reported as no authenticator.
pub trait AuthenticatorService: Send + Sync {
    /// Carrier identifier used in errors and logs.
    const ID: &'static str;

    type Authenticator: Authenticator;

    /// What the carrier puts on the wire (a cookie, a token, ...).
    type Value: Send;

    /// Issues a fresh authenticator for `login_info`.
    fn create(
        &self,
        login_info: LoginInfo,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<Self::Authenticator, AuthenticatorError>> + Send;

    /// Finds a valid authenticator in the request, if any.
    fn retrieve(
        &self,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<Option<Self::Authenticator>, AuthenticatorError>> + Send;

    /// Produces the carrier value, persisting the authenticator first for
    /// store-backed carriers.
    fn init(
        &self,
        authenticator: &Self::Authenticator,
    ) -> impl Future<Output = Result<Self::Value, AuthenticatorError>> + Send;

    /// Writes the carrier value into the response.
    ///
    /// # Errors
    ///
    /// Fails with an initialization error if the value cannot be carried.
    fn embed(
        &self,
        value: Self::Value,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError>;

    /// Amends the request with the carrier value, replacing a stale value of
    /// the same name and keeping the others.
    ///
    /// # Errors
    ///
    /// Fails with an initialization error if the value cannot be carried.
    fn embed_into_request(
        &self,
        value: Self::Value,
        request: AuthRequest,
    ) -> Result<AuthRequest, AuthenticatorError>;

    /// [`touch`] at the service clock's current time.
    fn touch(&self, authenticator: Self::Authenticator) -> Touched<Self::Authenticator>;

    /// Persists or re-embeds a touched authenticator.
    fn update(
        &self,
        authenticator: Self::Authenticator,
        response: AuthResponse,
    ) -> impl Future<Output = Result<AuthResponse, AuthenticatorError>> + Send;

    /// Revokes `authenticator`, then creates and initializes its successor
    /// for the same login info.
    fn renew_value(
        &self,
        authenticator: Self::Authenticator,
        request: &AuthRequest,
    ) -> impl Future<Output = Result<Self::Value, AuthenticatorError>> + Send;

    /// Removes `authenticator` from the store, if any, and clears the
    /// carrier value on the response.
    fn discard(
        &self,
        authenticator: Self::Authenticator,
        response: AuthResponse,
    ) -> impl Future<Output = Result<AuthResponse, AuthenticatorError>> + Send;

    /// [`renew_value`](Self::renew_value) followed by [`embed`](Self::embed).
    fn renew(
        &self,
        authenticator: Self::Authenticator,
        request: &AuthRequest,
        response: AuthResponse,
    ) -> impl Future<Output = Result<AuthResponse, AuthenticatorError>> + Send {
        async move {
            let value = self.renew_value(authenticator, request).await?;
            self.embed(value, response)
                .map_err(|e| AuthenticatorError::renewal(Self::ID, e))
        }
    }

    /// [`update`](Self::update) for a changed authenticator; an unchanged one
    /// leaves the response alone.
    fn update_touched(
        &self,
        touched: Touched<Self::Authenticator>,
        response: AuthResponse,
    ) -> impl Future<Output = Result<AuthResponse, AuthenticatorError>> + Send {
        async move {
            match touched {
                Touched::Changed(authenticator) => self.update(authenticator, response).await,
                Touched::Unchanged(_) => Ok(response),
            }
        }
    }
}

/// `now + expiry`, as a creation error when it leaves the representable
/// range.
pub(crate) fn expires_at(
    carrier: &'static str,
    now: OffsetDateTime,
    expiry: Duration,
) -> Result<OffsetDateTime, AuthenticatorError> {
    now.checked_add(expiry).ok_or_else(|| {
        AuthenticatorError::creation(carrier, format!("expiry of {expiry} is out of range"))
    })
}

/// Downgrades codec failures to "no authenticator"; store failures stay
/// errors.
pub(crate) fn resolve_decoded<A>(
    carrier: &'static str,
    decoded: Result<Option<A>, DecodeError>,
) -> Result<Option<A>, AuthenticatorError> {
    match decoded {
        Ok(authenticator) => Ok(authenticator),
        Err(DecodeError::Codec(e)) => {
            tracing::warn!(carrier, error = %e, "Discarding undecodable authenticator");
            Ok(None)
        }
        Err(DecodeError::Repository(e)) => Err(AuthenticatorError::retrieval(carrier, e)),
    }
}

/// `true` if the stored fingerprint matches the current request's.
pub(crate) fn fingerprint_matches(
    carrier: &'static str,
    id: &AuthenticatorId,
    stored: Option<&str>,
    current: &str,
) -> bool {
    if stored == Some(current) {
        return true;
    }
    tracing::info!(
        carrier,
        authenticator_id = %id,
        "Fingerprint mismatch, discarding authenticator"
    );
    false
}

pub(crate) fn still_valid<A: Authenticator>(
    carrier: &'static str,
    authenticator: A,
    now: OffsetDateTime,
) -> Option<A> {
    if authenticator.is_valid(now) {
        Some(authenticator)
    } else {
        tracing::debug!(
            carrier,
            authenticator_id = %authenticator.id(),
            "Authenticator expired"
        );
        None
    }
}
