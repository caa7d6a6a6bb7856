use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::{
    Authenticator, AuthenticatorService, Touched, expires_at, fingerprint_matches, resolve_decoded,
    still_valid,
};
use crate::clock::Clock;
use crate::codec::AuthenticatorCodec;
use crate::config::CookieAuthenticatorSettings;
use crate::cookies::{self, CookieSpec};
use crate::error::AuthenticatorError;
use crate::fingerprint::FingerprintGenerator;
use crate::http::{AuthRequest, AuthResponse};
use crate::id::IdGenerator;
use crate::types::{AuthenticatorId, LoginInfo, option_duration_secs};

/// Authenticator carried in a cookie, either as a store key or as the
/// signed and encrypted record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieAuthenticator {
    pub id: AuthenticatorId,
    pub login_info: LoginInfo,
    #[serde(with = "time::serde::timestamp")]
    pub last_used_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "option_duration_secs", default)]
    pub idle_timeout: Option<Duration>,
    /// Lifetime of the cookie itself; `None` for a browser-session cookie.
    #[serde(with = "option_duration_secs", default)]
    pub cookie_max_age: Option<Duration>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Authenticator for CookieAuthenticator {
    fn id(&self) -> &AuthenticatorId {
        &self.id
    }

    fn login_info(&self) -> &LoginInfo {
        &self.login_info
    }

    fn last_used_at(&self) -> OffsetDateTime {
        self.last_used_at
    }

    fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    fn with_last_used_at(self, at: OffsetDateTime) -> Self {
        Self {
            last_used_at: at,
            ..self
        }
    }
}

/// Cookie carrier.
///
/// Store-backed or self-contained depending on the [`AuthenticatorCodec`]
/// it is built with.
pub struct CookieAuthenticatorService {
    settings: CookieAuthenticatorSettings,
    codec: AuthenticatorCodec<CookieAuthenticator>,
    fingerprint_generator: Arc<dyn FingerprintGenerator>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl CookieAuthenticatorService {
    #[must_use]
    pub fn new(
        settings: CookieAuthenticatorSettings,
        codec: AuthenticatorCodec<CookieAuthenticator>,
        fingerprint_generator: Arc<dyn FingerprintGenerator>,
        id_generator: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            codec,
            fingerprint_generator,
            id_generator,
            clock,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CookieAuthenticatorSettings {
        &self.settings
    }

    fn cookie_spec(&self, authenticator: &CookieAuthenticator) -> CookieSpec<'_> {
        CookieSpec {
            max_age: authenticator.cookie_max_age,
            ..self.settings.cookie_spec()
        }
    }
}

impl AuthenticatorService for CookieAuthenticatorService {
    const ID: &'static str = "cookie-authenticator";

    type Authenticator = CookieAuthenticator;
    type Value = Cookie<'static>;

    async fn create(
        &self,
        login_info: LoginInfo,
        request: &AuthRequest,
    ) -> Result<CookieAuthenticator, AuthenticatorError> {
        let id = self
            .id_generator
            .generate()
            .map_err(|e| AuthenticatorError::creation(Self::ID, e))?;
        let now = self.clock.now();
        let expires_at = expires_at(Self::ID, now, self.settings.authenticator_expiry)?;

        let authenticator = CookieAuthenticator {
            id: id.into(),
            login_info,
            last_used_at: now,
            expires_at,
            idle_timeout: self.settings.authenticator_idle_timeout,
            cookie_max_age: self.settings.cookie_max_age,
            fingerprint: self
                .settings
                .use_fingerprinting
                .then(|| self.fingerprint_generator.generate(request)),
        };
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator created"
        );
        Ok(authenticator)
    }

    async fn retrieve(
        &self,
        request: &AuthRequest,
    ) -> Result<Option<CookieAuthenticator>, AuthenticatorError> {
        let Some(raw) = request.cookie(&self.settings.cookie_name) else {
            return Ok(None);
        };
        let Some(authenticator) = resolve_decoded(Self::ID, self.codec.decode(raw).await)? else {
            return Ok(None);
        };

        if self.settings.use_fingerprinting
            && !fingerprint_matches(
                Self::ID,
                &authenticator.id,
                authenticator.fingerprint.as_deref(),
                &self.fingerprint_generator.generate(request),
            )
        {
            return Ok(None);
        }
        Ok(still_valid(Self::ID, authenticator, self.clock.now()))
    }

    async fn init(
        &self,
        authenticator: &CookieAuthenticator,
    ) -> Result<Cookie<'static>, AuthenticatorError> {
        let value = self
            .codec
            .encode(authenticator)
            .await
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))?;
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator initialized"
        );
        Ok(cookies::build(self.cookie_spec(authenticator), value))
    }

    fn embed(
        &self,
        value: Cookie<'static>,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        Ok(response.set_cookie(value))
    }

    fn embed_into_request(
        &self,
        value: Cookie<'static>,
        request: AuthRequest,
    ) -> Result<AuthRequest, AuthenticatorError> {
        Ok(request.with_cookie(value))
    }

    fn touch(&self, authenticator: CookieAuthenticator) -> Touched<CookieAuthenticator> {
        super::touch(authenticator, self.clock.now())
    }

    async fn update(
        &self,
        authenticator: CookieAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        let value = self
            .codec
            .persist_update(&authenticator)
            .await
            .map_err(|e| AuthenticatorError::update(Self::ID, e))?;
        Ok(match value {
            Some(value) => response.set_cookie(cookies::build(self.cookie_spec(&authenticator), value)),
            None => response,
        })
    }

    async fn renew_value(
        &self,
        authenticator: CookieAuthenticator,
        request: &AuthRequest,
    ) -> Result<Cookie<'static>, AuthenticatorError> {
        self.codec
            .revoke(&authenticator.id)
            .await
            .map_err(|e| AuthenticatorError::renewal(Self::ID, e))?;

        let renewed = self
            .create(authenticator.login_info, request)
            .await
            .map_err(|e| AuthenticatorError::renewal(Self::ID, e))?;
        let value = self
            .init(&renewed)
            .await
            .map_err(|e| AuthenticatorError::renewal(Self::ID, e))?;
        tracing::debug!(
            carrier = Self::ID,
            previous_id = %authenticator.id,
            authenticator_id = %renewed.id,
            "Authenticator renewed"
        );
        Ok(value)
    }

    async fn discard(
        &self,
        authenticator: CookieAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        self.codec
            .revoke(&authenticator.id)
            .await
            .map_err(|e| AuthenticatorError::discard(Self::ID, e))?;
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator discarded"
        );
        Ok(response.remove_cookie(cookies::removal(self.settings.cookie_spec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChaChaCrypter;
    use crate::error::Phase;
    use crate::repository::{AuthenticatorRepository, InMemoryAuthenticatorRepository};
    use crate::test_support::{
        FailingIdGenerator, FailingRepository, HeaderFingerprintGenerator, MockClock,
        SequenceIdGenerator, at, login, request_from, test_signer,
    };

    fn self_contained(
        settings: CookieAuthenticatorSettings,
        clock: &Arc<MockClock>,
    ) -> CookieAuthenticatorService {
        CookieAuthenticatorService::new(
            settings,
            AuthenticatorCodec::self_contained(
                test_signer(),
                Arc::new(ChaChaCrypter::new("cookie-secret")),
            ),
            Arc::new(HeaderFingerprintGenerator),
            Arc::new(SequenceIdGenerator::default()),
            clock.clone(),
        )
    }

    fn store_backed(
        repository: Arc<dyn AuthenticatorRepository<CookieAuthenticator>>,
        clock: &Arc<MockClock>,
    ) -> CookieAuthenticatorService {
        CookieAuthenticatorService::new(
            CookieAuthenticatorSettings::default(),
            AuthenticatorCodec::store_backed(repository),
            Arc::new(HeaderFingerprintGenerator),
            Arc::new(SequenceIdGenerator::default()),
            clock.clone(),
        )
    }

    /// Runs create/init/embed and returns the request a browser would send
    /// back with the resulting cookie.
    async fn login_as(
        service: &CookieAuthenticatorService,
        fingerprint: &str,
    ) -> (CookieAuthenticator, Cookie<'static>) {
        let authenticator = service.create(login(), &request_from(fingerprint)).await.unwrap();
        let cookie = service.init(&authenticator).await.unwrap();
        (authenticator, cookie)
    }

    fn returning(cookie: &Cookie<'static>, fingerprint: &str) -> AuthRequest {
        request_from(fingerprint).with_cookie(Cookie::new(cookie.name().to_owned(), cookie.value().to_owned()))
    }

    #[tokio::test]
    async fn idle_timeout_expiry_and_fingerprint() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(
            CookieAuthenticatorSettings::default()
                .with_expiry(Duration::hours(1))
                .with_idle_timeout(Some(Duration::minutes(30)))
                .with_fingerprinting(true),
            &clock,
        );
        let (authenticator, cookie) = login_as(&service, "fp1").await;

        clock.set(at(10 * 60));
        assert_eq!(
            service.retrieve(&returning(&cookie, "fp1")).await.unwrap(),
            Some(authenticator)
        );
        assert_eq!(service.retrieve(&returning(&cookie, "fp2")).await.unwrap(), None);

        clock.set(at(31 * 60));
        assert_eq!(service.retrieve(&returning(&cookie, "fp1")).await.unwrap(), None);

        clock.set(at(61 * 60));
        assert_eq!(service.retrieve(&returning(&cookie, "fp1")).await.unwrap(), None);
        assert_eq!(service.retrieve(&returning(&cookie, "fp2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn touch_and_update_extend_idle_window() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(
            CookieAuthenticatorSettings::default()
                .with_expiry(Duration::hours(1))
                .with_idle_timeout(Some(Duration::minutes(30))),
            &clock,
        );
        let (_, cookie) = login_as(&service, "fp1").await;

        clock.set(at(20 * 60));
        let authenticator = service.retrieve(&returning(&cookie, "fp1")).await.unwrap().unwrap();
        let response = service
            .update_touched(service.touch(authenticator), AuthResponse::new())
            .await
            .unwrap();
        let refreshed = response.cookie("authenticator").unwrap().clone();

        clock.set(at(45 * 60));
        assert_eq!(service.retrieve(&returning(&cookie, "fp1")).await.unwrap(), None);
        let found = service.retrieve(&returning(&refreshed, "fp1")).await.unwrap().unwrap();
        assert_eq!(found.last_used_at, at(20 * 60));
    }

    #[tokio::test]
    async fn unchanged_touch_leaves_response_alone() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(CookieAuthenticatorSettings::default(), &clock);
        let (authenticator, _) = login_as(&service, "fp1").await;

        let touched = service.touch(authenticator);
        assert!(!touched.is_changed());
        let response = service.update_touched(touched, AuthResponse::new()).await.unwrap();
        assert!(response.cookie("authenticator").is_none());
    }

    #[tokio::test]
    async fn missing_or_foreign_cookie_is_none() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(CookieAuthenticatorSettings::default(), &clock);

        assert_eq!(service.retrieve(&request_from("fp1")).await.unwrap(), None);

        let foreign = request_from("fp1").with_cookie(Cookie::new("authenticator", "garbage"));
        assert_eq!(service.retrieve(&foreign).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tampered_cookie_is_none() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(CookieAuthenticatorSettings::default(), &clock);
        let (_, cookie) = login_as(&service, "fp1").await;

        let mut value = cookie.value().to_owned().into_bytes();
        let last = value.len() - 1;
        value[last] = if value[last] == b'A' { b'B' } else { b'A' };
        let tampered = Cookie::new("authenticator", String::from_utf8(value).unwrap());

        assert_eq!(
            service
                .retrieve(&request_from("fp1").with_cookie(tampered))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn fingerprinting_off_ignores_client() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(
            CookieAuthenticatorSettings::default().with_fingerprinting(false),
            &clock,
        );
        let (authenticator, cookie) = login_as(&service, "fp1").await;

        assert_eq!(authenticator.fingerprint, None);
        assert!(service.retrieve(&returning(&cookie, "fp2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cookie_attributes_follow_settings() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(
            CookieAuthenticatorSettings::default()
                .with_cookie_name("sid")
                .with_cookie_path("/app")
                .with_cookie_max_age(Some(Duration::days(14))),
            &clock,
        );
        let (authenticator, cookie) = login_as(&service, "fp1").await;

        assert_eq!(authenticator.cookie_max_age, Some(Duration::days(14)));
        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.max_age(), Some(Duration::days(14)));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[tokio::test]
    async fn embed_into_request_replaces_stale_value() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = self_contained(CookieAuthenticatorSettings::default(), &clock);
        let (authenticator, cookie) = login_as(&service, "fp1").await;

        let request = request_from("fp1")
            .with_cookie(Cookie::new("authenticator", "stale"))
            .with_cookie(Cookie::new("theme", "dark"));
        let request = service.embed_into_request(cookie, request).unwrap();

        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(service.retrieve(&request).await.unwrap(), Some(authenticator));
    }

    #[tokio::test]
    async fn store_backed_cookie_carries_the_id() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<CookieAuthenticator>::new());
        let service = store_backed(repository.clone(), &clock);
        let (authenticator, cookie) = login_as(&service, "fp1").await;

        assert_eq!(cookie.value(), authenticator.id.as_str());
        assert_eq!(
            repository.find(&authenticator.id).await.unwrap(),
            Some(authenticator.clone())
        );
        assert_eq!(
            service.retrieve(&returning(&cookie, "fp1")).await.unwrap(),
            Some(authenticator)
        );
    }

    #[tokio::test]
    async fn store_backed_update_writes_to_store_only() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<CookieAuthenticator>::new());
        let service = store_backed(repository.clone(), &clock);
        let (authenticator, _) = login_as(&service, "fp1").await;

        let touched = authenticator.clone().with_last_used_at(at(90));
        let response = service.update(touched.clone(), AuthResponse::new()).await.unwrap();

        assert!(response.cookie("authenticator").is_none());
        assert_eq!(repository.find(&authenticator.id).await.unwrap(), Some(touched));
    }

    #[tokio::test]
    async fn renew_revokes_before_issuing() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<CookieAuthenticator>::new());
        let service = store_backed(repository.clone(), &clock);
        let (old, old_cookie) = login_as(&service, "fp1").await;

        clock.set(at(60));
        let response = service
            .renew(old.clone(), &request_from("fp1"), AuthResponse::new())
            .await
            .unwrap();
        let new_cookie = response.cookie("authenticator").unwrap().clone();

        assert_ne!(new_cookie.value(), old_cookie.value());
        assert_eq!(repository.find(&old.id).await.unwrap(), None);
        assert_eq!(service.retrieve(&returning(&old_cookie, "fp1")).await.unwrap(), None);

        let renewed = service.retrieve(&returning(&new_cookie, "fp1")).await.unwrap().unwrap();
        assert_ne!(renewed.id, old.id);
        assert_eq!(renewed.login_info, old.login_info);
        assert_eq!(renewed.last_used_at, at(60));
    }

    #[tokio::test]
    async fn discard_removes_record_and_clears_cookie() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<CookieAuthenticator>::new());
        let service = store_backed(repository.clone(), &clock);
        let (authenticator, _) = login_as(&service, "fp1").await;

        let response = service
            .discard(authenticator.clone(), AuthResponse::new())
            .await
            .unwrap();
        assert!(repository.is_empty().await);
        let cleared = response.cookie("authenticator").unwrap();
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(Duration::ZERO));

        // A second discard races with the missing record and still clears.
        let response = service.discard(authenticator, AuthResponse::new()).await.unwrap();
        assert!(response.cookie("authenticator").is_some());
    }

    #[tokio::test]
    async fn unreachable_store_is_a_retrieval_error() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = store_backed(Arc::new(FailingRepository), &clock);
        let request = request_from("fp1").with_cookie(Cookie::new("authenticator", "id-1"));

        let err = service.retrieve(&request).await.unwrap_err();
        assert_eq!(err.phase(), Phase::Retrieval);
        assert_eq!(err.carrier(), "cookie-authenticator");
    }

    #[tokio::test]
    async fn store_failure_on_init_is_an_initialization_error() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = store_backed(Arc::new(FailingRepository), &clock);
        let authenticator = service.create(login(), &request_from("fp1")).await.unwrap();

        let err = service.init(&authenticator).await.unwrap_err();
        assert_eq!(err.phase(), Phase::Initialization);
    }

    #[tokio::test]
    async fn id_generation_failure_is_a_creation_error() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = CookieAuthenticatorService::new(
            CookieAuthenticatorSettings::default(),
            AuthenticatorCodec::self_contained(
                test_signer(),
                Arc::new(ChaChaCrypter::new("cookie-secret")),
            ),
            Arc::new(HeaderFingerprintGenerator),
            Arc::new(FailingIdGenerator),
            clock,
        );

        let err = service.create(login(), &request_from("fp1")).await.unwrap_err();
        assert_eq!(err.phase(), Phase::Creation);
        assert_eq!(
            err.to_string(),
            "[cookie-authenticator] could not create authenticator"
        );
    }
}
