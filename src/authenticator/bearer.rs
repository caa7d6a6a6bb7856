use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use super::{Authenticator, AuthenticatorService, Touched, expires_at, still_valid};
use crate::clock::Clock;
use crate::config::BearerTokenAuthenticatorSettings;
use crate::error::AuthenticatorError;
use crate::http::{AuthRequest, AuthResponse};
use crate::id::IdGenerator;
use crate::repository::AuthenticatorRepository;
use crate::types::{AuthenticatorId, LoginInfo};

/// Authenticator behind an opaque token sent in a header or query string.
/// The token is the ID; the record only lives in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerTokenAuthenticator {
    pub id: AuthenticatorId,
    pub login_info: LoginInfo,
    pub last_used_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub idle_timeout: Option<Duration>,
}

impl Authenticator for BearerTokenAuthenticator {
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

/// Bearer-token carrier. Always store-backed.
pub struct BearerTokenAuthenticatorService {
    settings: BearerTokenAuthenticatorSettings,
    repository: Arc<dyn AuthenticatorRepository<BearerTokenAuthenticator>>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl BearerTokenAuthenticatorService {
    #[must_use]
    pub fn new(
        settings: BearerTokenAuthenticatorSettings,
        repository: Arc<dyn AuthenticatorRepository<BearerTokenAuthenticator>>,
        id_generator: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            repository,
            id_generator,
            clock,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &BearerTokenAuthenticatorSettings {
        &self.settings
    }
}

impl AuthenticatorService for BearerTokenAuthenticatorService {
    const ID: &'static str = "bearer-token-authenticator";

    type Authenticator = BearerTokenAuthenticator;
    type Value = String;

    async fn create(
        &self,
        login_info: LoginInfo,
        _request: &AuthRequest,
    ) -> Result<BearerTokenAuthenticator, AuthenticatorError> {
        let id = self
            .id_generator
            .generate()
            .map_err(|e| AuthenticatorError::creation(Self::ID, e))?;
        let now = self.clock.now();
        let expires_at = expires_at(Self::ID, now, self.settings.authenticator_expiry)?;

        let authenticator = BearerTokenAuthenticator {
            id: id.into(),
            login_info,
            last_used_at: now,
            expires_at,
            idle_timeout: self.settings.authenticator_idle_timeout,
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
    ) -> Result<Option<BearerTokenAuthenticator>, AuthenticatorError> {
        let Some(token) =
            request.find_value(&self.settings.header_name, &self.settings.request_parts)
        else {
            return Ok(None);
        };
        let found = self
            .repository
            .find(&AuthenticatorId::from(token))
            .await
            .map_err(|e| AuthenticatorError::retrieval(Self::ID, e))?;
        Ok(found.and_then(|authenticator| still_valid(Self::ID, authenticator, self.clock.now())))
    }

    async fn init(&self, authenticator: &BearerTokenAuthenticator) -> Result<String, AuthenticatorError> {
        let stored = self
            .repository
            .add(authenticator.clone())
            .await
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))?;
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %stored.id,
            "Authenticator initialized"
        );
        Ok(stored.id.into())
    }

    fn embed(&self, value: String, response: AuthResponse) -> Result<AuthResponse, AuthenticatorError> {
        response
            .set_header(self.settings.header_name.clone(), &value)
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))
    }

    fn embed_into_request(
        &self,
        value: String,
        request: AuthRequest,
    ) -> Result<AuthRequest, AuthenticatorError> {
        request
            .with_header(self.settings.header_name.clone(), &value)
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))
    }

    fn touch(&self, authenticator: BearerTokenAuthenticator) -> Touched<BearerTokenAuthenticator> {
        super::touch(authenticator, self.clock.now())
    }

    async fn update(
        &self,
        authenticator: BearerTokenAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        self.repository
            .update(authenticator)
            .await
            .map_err(|e| AuthenticatorError::update(Self::ID, e))?;
        Ok(response)
    }

    async fn renew_value(
        &self,
        authenticator: BearerTokenAuthenticator,
        request: &AuthRequest,
    ) -> Result<String, AuthenticatorError> {
        self.repository
            .remove(&authenticator.id)
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
        authenticator: BearerTokenAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        self.repository
            .remove(&authenticator.id)
            .await
            .map_err(|e| AuthenticatorError::discard(Self::ID, e))?;
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator discarded"
        );
        Ok(response.remove_header(&self.settings.header_name))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderName;

    use super::*;
    use crate::error::Phase;
    use crate::http::RequestPart;
    use crate::repository::InMemoryAuthenticatorRepository;
    use crate::test_support::{FailingRepository, MockClock, SequenceIdGenerator, at, login};

    fn service(
        settings: BearerTokenAuthenticatorSettings,
        repository: Arc<dyn AuthenticatorRepository<BearerTokenAuthenticator>>,
        clock: &Arc<MockClock>,
    ) -> BearerTokenAuthenticatorService {
        BearerTokenAuthenticatorService::new(
            settings,
            repository,
            Arc::new(SequenceIdGenerator::default()),
            clock.clone(),
        )
    }

    fn repository() -> Arc<InMemoryAuthenticatorRepository<BearerTokenAuthenticator>> {
        Arc::new(InMemoryAuthenticatorRepository::new())
    }

    #[tokio::test]
    async fn token_in_header_resolves_through_store() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = repository();
        let service = service(BearerTokenAuthenticatorSettings::default(), repository.clone(), &clock);

        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();
        assert_eq!(token, "id-1");

        let response = service.embed(token.clone(), AuthResponse::new()).unwrap();
        assert_eq!(response.header("x-auth-token"), Some("id-1"));

        let request = service.embed_into_request(token, AuthRequest::default()).unwrap();
        assert_eq!(service.retrieve(&request).await.unwrap(), Some(authenticator));
    }

    #[tokio::test]
    async fn query_string_only_when_configured() {
        let clock = Arc::new(MockClock::new(at(0)));
        let settings = BearerTokenAuthenticatorSettings::default()
            .with_header_name(HeaderName::from_static("x-api-token"))
            .with_request_parts(vec![RequestPart::QueryString]);
        let service = service(settings, repository(), &clock);
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();

        let in_query = AuthRequest::default()
            .with_uri(format!("/api?x-api-token={token}").parse().unwrap());
        assert!(service.retrieve(&in_query).await.unwrap().is_some());

        let in_header = AuthRequest::default().with_header("x-api-token", &token).unwrap();
        assert_eq!(service.retrieve(&in_header).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_or_expired_token_is_none() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(
            BearerTokenAuthenticatorSettings::default().with_expiry(Duration::minutes(5)),
            repository(),
            &clock,
        );
        let unknown = AuthRequest::default().with_header("x-auth-token", "nope").unwrap();
        assert_eq!(service.retrieve(&unknown).await.unwrap(), None);

        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();
        let request = AuthRequest::default().with_header("x-auth-token", &token).unwrap();

        clock.set(at(5 * 60));
        assert_eq!(service.retrieve(&request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_persists_touch() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = repository();
        let service = service(
            BearerTokenAuthenticatorSettings::default().with_idle_timeout(Some(Duration::minutes(10))),
            repository.clone(),
            &clock,
        );
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        service.init(&authenticator).await.unwrap();

        clock.set(at(8 * 60));
        let touched = service.touch(authenticator.clone());
        let response = service.update_touched(touched, AuthResponse::new()).await.unwrap();
        assert_eq!(response.header("x-auth-token"), None);

        let stored = repository.find(&authenticator.id).await.unwrap().unwrap();
        assert_eq!(stored.last_used_at, at(8 * 60));
    }

    #[tokio::test]
    async fn renew_makes_old_token_unusable() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = repository();
        let service = service(BearerTokenAuthenticatorSettings::default(), repository.clone(), &clock);
        let old = service.create(login(), &AuthRequest::default()).await.unwrap();
        let old_token = service.init(&old).await.unwrap();

        let response = service
            .renew(old.clone(), &AuthRequest::default(), AuthResponse::new())
            .await
            .unwrap();
        let new_token = response.header("x-auth-token").unwrap().to_owned();

        assert_ne!(new_token, old_token);
        assert_eq!(repository.find(&old.id).await.unwrap(), None);
        let old_request = AuthRequest::default().with_header("x-auth-token", &old_token).unwrap();
        assert_eq!(service.retrieve(&old_request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn discard_clears_header_even_without_record() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = repository();
        let service = service(BearerTokenAuthenticatorSettings::default(), repository.clone(), &clock);
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();
        let response = service.embed(token, AuthResponse::new()).unwrap();

        let response = service.discard(authenticator.clone(), response).await.unwrap();
        assert_eq!(response.header("x-auth-token"), None);
        assert!(repository.is_empty().await);

        assert!(service.discard(authenticator, AuthResponse::new()).await.is_ok());
    }

    #[tokio::test]
    async fn store_failures_are_phase_qualified() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(
            BearerTokenAuthenticatorSettings::default(),
            Arc::new(FailingRepository),
            &clock,
        );
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();

        let request = AuthRequest::default().with_header("x-auth-token", "id-1").unwrap();
        assert_eq!(service.retrieve(&request).await.unwrap_err().phase(), Phase::Retrieval);
        assert_eq!(
            service.init(&authenticator).await.unwrap_err().phase(),
            Phase::Initialization
        );
        assert_eq!(
            service
                .update(authenticator.clone(), AuthResponse::new())
                .await
                .unwrap_err()
                .phase(),
            Phase::Update
        );
        assert_eq!(
            service
                .renew(authenticator.clone(), &AuthRequest::default(), AuthResponse::new())
                .await
                .unwrap_err()
                .phase(),
            Phase::Renewal
        );
        assert_eq!(
            service
                .discard(authenticator, AuthResponse::new())
                .await
                .unwrap_err()
                .phase(),
            Phase::Discard
        );
    }

    #[tokio::test]
    async fn unrepresentable_expiry_fails_creation() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = repository();
        let service = service(
            BearerTokenAuthenticatorSettings::default().with_expiry(Duration::MAX),
            repository.clone(),
            &clock,
        );

        let err = service
            .create(login(), &AuthRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Phase::Creation);
        assert_eq!(err.carrier(), "bearer-token-authenticator");
        assert!(repository.is_empty().await);
    }
}
