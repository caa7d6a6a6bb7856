use std::sync::Arc;

use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use super::{Authenticator, AuthenticatorService, Touched, expires_at, resolve_decoded, still_valid};
use crate::clock::Clock;
use crate::codec::{DecodeError, JwtCodec};
use crate::config::JwtAuthenticatorSettings;
use crate::error::{AuthenticatorError, BoxError};
use crate::http::{AuthRequest, AuthResponse};
use crate::id::IdGenerator;
use crate::repository::AuthenticatorRepository;
use crate::types::{AuthenticatorId, LoginInfo};

/// Authenticator carried as a signed claim token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtAuthenticator {
    pub id: AuthenticatorId,
    pub login_info: LoginInfo,
    pub last_used_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub idle_timeout: Option<Duration>,
    /// Extra claims to carry. Names must not collide with reserved claims.
    pub custom_claims: Option<Map<String, Value>>,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn with_custom_claims(self, claims: Map<String, Value>) -> Self {
        Self {
            custom_claims: Some(claims),
            ..self
        }
    }
}

impl Authenticator for JwtAuthenticator {
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

/// Claim-token carrier.
///
/// Self-contained by default. With a repository, issued tokens are recorded
/// and a token whose record is gone no longer authenticates, which makes
/// discard and renew revoke server-side.
pub struct JwtAuthenticatorService {
    settings: JwtAuthenticatorSettings,
    codec: JwtCodec,
    repository: Option<Arc<dyn AuthenticatorRepository<JwtAuthenticator>>>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl JwtAuthenticatorService {
    #[must_use]
    pub fn new(
        settings: JwtAuthenticatorSettings,
        codec: JwtCodec,
        repository: Option<Arc<dyn AuthenticatorRepository<JwtAuthenticator>>>,
        id_generator: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            codec,
            repository,
            id_generator,
            clock,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &JwtAuthenticatorSettings {
        &self.settings
    }

    async fn decode(&self, token: &str) -> Result<Option<JwtAuthenticator>, DecodeError> {
        let decoded = self
            .codec
            .unserialize(token, &self.settings)
            .map_err(DecodeError::Codec)?;
        match &self.repository {
            Some(repository) => repository
                .find(&decoded.id)
                .await
                .map_err(DecodeError::Repository),
            None => Ok(Some(decoded)),
        }
    }

    async fn revoke(&self, id: &AuthenticatorId) -> Result<(), BoxError> {
        match &self.repository {
            Some(repository) => repository.remove(id).await,
            None => Ok(()),
        }
    }
}

impl AuthenticatorService for JwtAuthenticatorService {
    const ID: &'static str = "jwt-authenticator";

    type Authenticator = JwtAuthenticator;
    type Value = String;

    async fn create(
        &self,
        login_info: LoginInfo,
        _request: &AuthRequest,
    ) -> Result<JwtAuthenticator, AuthenticatorError> {
        let id = self
            .id_generator
            .generate()
            .map_err(|e| AuthenticatorError::creation(Self::ID, e))?;
        let now = self.clock.now();
        let expires_at = expires_at(Self::ID, now, self.settings.authenticator_expiry)?;

        let authenticator = JwtAuthenticator {
            id: id.into(),
            login_info,
            last_used_at: now,
            expires_at,
            idle_timeout: self.settings.authenticator_idle_timeout,
            custom_claims: None,
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
    ) -> Result<Option<JwtAuthenticator>, AuthenticatorError> {
        let Some(token) =
            request.find_value(&self.settings.header_name, &self.settings.request_parts)
        else {
            return Ok(None);
        };
        let decoded = resolve_decoded(Self::ID, self.decode(&token).await)?;
        Ok(decoded.and_then(|authenticator| still_valid(Self::ID, authenticator, self.clock.now())))
    }

    async fn init(&self, authenticator: &JwtAuthenticator) -> Result<String, AuthenticatorError> {
        // A reserved-claim collision must fail before anything is stored.
        let token = self
            .codec
            .serialize(authenticator, &self.settings)
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))?;
        if let Some(repository) = &self.repository {
            repository
                .add(authenticator.clone())
                .await
                .map_err(|e| AuthenticatorError::initialization(Self::ID, e))?;
        }
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator initialized"
        );
        Ok(token)
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

    fn touch(&self, authenticator: JwtAuthenticator) -> Touched<JwtAuthenticator> {
        super::touch(authenticator, self.clock.now())
    }

    /// Always re-issues the token, since `iat` carries the last-used time.
    async fn update(
        &self,
        authenticator: JwtAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        let token = self
            .codec
            .serialize(&authenticator, &self.settings)
            .map_err(|e| AuthenticatorError::update(Self::ID, e))?;
        if let Some(repository) = &self.repository {
            repository
                .update(authenticator)
                .await
                .map_err(|e| AuthenticatorError::update(Self::ID, e))?;
        }
        response
            .set_header(self.settings.header_name.clone(), &token)
            .map_err(|e| AuthenticatorError::update(Self::ID, e))
    }

    async fn renew_value(
        &self,
        authenticator: JwtAuthenticator,
        request: &AuthRequest,
    ) -> Result<String, AuthenticatorError> {
        self.revoke(&authenticator.id)
            .await
            .map_err(|e| AuthenticatorError::renewal(Self::ID, e))?;

        let renewed = self
            .create(authenticator.login_info, request)
            .await
            .map_err(|e| AuthenticatorError::renewal(Self::ID, e))?;
        let renewed = match authenticator.custom_claims {
            Some(claims) => renewed.with_custom_claims(claims),
            None => renewed,
        };
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
        authenticator: JwtAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        self.revoke(&authenticator.id)
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
    use serde_json::json;

    use super::*;
    use crate::crypto::ChaChaCrypter;
    use crate::error::{CodecError, Phase};
    use crate::repository::InMemoryAuthenticatorRepository;
    use crate::test_support::{MockClock, SequenceIdGenerator, at, login};

    fn service(
        settings: JwtAuthenticatorSettings,
        repository: Option<Arc<dyn AuthenticatorRepository<JwtAuthenticator>>>,
        clock: &Arc<MockClock>,
    ) -> JwtAuthenticatorService {
        JwtAuthenticatorService::new(
            settings,
            JwtCodec::new(
                b"jwt-shared-secret-0123456789abcdef",
                Arc::new(ChaChaCrypter::new("subject-secret")),
            )
            .unwrap(),
            repository,
            Arc::new(SequenceIdGenerator::default()),
            clock.clone(),
        )
    }

    fn with_token(token: &str) -> AuthRequest {
        AuthRequest::default().with_header("x-auth-token", token).unwrap()
    }

    #[tokio::test]
    async fn stateless_round_trip() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(JwtAuthenticatorSettings::default(), None, &clock);
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();

        let response = service.embed(token.clone(), AuthResponse::new()).unwrap();
        assert_eq!(response.header("x-auth-token"), Some(token.as_str()));
        assert_eq!(service.retrieve(&with_token(&token)).await.unwrap(), Some(authenticator));
    }

    #[tokio::test]
    async fn expiry_uses_service_clock() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(
            JwtAuthenticatorSettings::default().with_expiry(Duration::hours(1)),
            None,
            &clock,
        );
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();

        clock.set(at(3599));
        assert!(service.retrieve(&with_token(&token)).await.unwrap().is_some());
        clock.set(at(3600));
        assert_eq!(service.retrieve(&with_token(&token)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reserved_custom_claim_fails_initialization() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<JwtAuthenticator>::new());
        let service = service(
            JwtAuthenticatorSettings::default(),
            Some(repository.clone()),
            &clock,
        );
        let mut claims = Map::new();
        claims.insert("iss".into(), json!("attacker"));
        let authenticator = service
            .create(login(), &AuthRequest::default())
            .await
            .unwrap()
            .with_custom_claims(claims);

        let err = service.init(&authenticator).await.unwrap_err();
        assert_eq!(err.phase(), Phase::Initialization);
        let cause = std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<CodecError>())
            .unwrap();
        assert_eq!(cause, &CodecError::ReservedClaimOverride("iss".into()));
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn garbage_token_is_none() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(JwtAuthenticatorSettings::default(), None, &clock);
        assert_eq!(service.retrieve(&with_token("a.b.c")).await.unwrap(), None);
        assert_eq!(service.retrieve(&AuthRequest::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_reissues_token() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(
            JwtAuthenticatorSettings::default().with_idle_timeout(Some(Duration::minutes(30))),
            None,
            &clock,
        );
        let authenticator = service.create(login(), &AuthRequest::default()).await.unwrap();
        let token = service.init(&authenticator).await.unwrap();

        clock.set(at(20 * 60));
        let touched = service.touch(authenticator);
        let response = service.update_touched(touched, AuthResponse::new()).await.unwrap();
        let reissued = response.header("x-auth-token").unwrap().to_owned();
        assert_ne!(reissued, token);

        clock.set(at(40 * 60));
        assert_eq!(service.retrieve(&with_token(&token)).await.unwrap(), None);
        let found = service.retrieve(&with_token(&reissued)).await.unwrap().unwrap();
        assert_eq!(found.last_used_at, at(20 * 60));
    }

    #[tokio::test]
    async fn repository_acts_as_revocation_list() {
        let clock = Arc::new(MockClock::new(at(0)));
        let repository = Arc::new(InMemoryAuthenticatorRepository::<JwtAuthenticator>::new());
        let service = service(
            JwtAuthenticatorSettings::default(),
            Some(repository.clone()),
            &clock,
        );
        let old = service.create(login(), &AuthRequest::default()).await.unwrap();
        let old_token = service.init(&old).await.unwrap();
        assert!(service.retrieve(&with_token(&old_token)).await.unwrap().is_some());

        let response = service
            .renew(old.clone(), &AuthRequest::default(), AuthResponse::new())
            .await
            .unwrap();
        let new_token = response.header("x-auth-token").unwrap().to_owned();

        assert_eq!(service.retrieve(&with_token(&old_token)).await.unwrap(), None);
        let renewed = service.retrieve(&with_token(&new_token)).await.unwrap().unwrap();
        assert_ne!(renewed.id, old.id);

        let response = service.discard(renewed, response).await.unwrap();
        assert_eq!(response.header("x-auth-token"), None);
        assert_eq!(service.retrieve(&with_token(&new_token)).await.unwrap(), None);
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn renew_keeps_custom_claims() {
        let clock = Arc::new(MockClock::new(at(0)));
        let service = service(JwtAuthenticatorSettings::default(), None, &clock);
        let mut claims = Map::new();
        claims.insert("role".into(), json!("admin"));
        let old = service
            .create(login(), &AuthRequest::default())
            .await
            .unwrap()
            .with_custom_claims(claims.clone());

        let token = service.renew_value(old, &AuthRequest::default()).await.unwrap();
        let renewed = service.retrieve(&with_token(&token)).await.unwrap().unwrap();
        assert_eq!(renewed.custom_claims, Some(claims));
    }
}
