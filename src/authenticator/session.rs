use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::{
    Authenticator, AuthenticatorService, Touched, expires_at, fingerprint_matches, resolve_decoded,
    still_valid,
};
use crate::clock::Clock;
use crate::codec::{DecodeError, SignedJsonCodec};
use crate::config::SessionAuthenticatorSettings;
use crate::error::{AuthenticatorError, CodecError};
use crate::fingerprint::FingerprintGenerator;
use crate::http::{AuthRequest, AuthResponse};
use crate::id::IdGenerator;
use crate::types::{AuthenticatorId, LoginInfo, option_duration_secs};

/// Authenticator kept, signed and encrypted, in the framework session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAuthenticator {
    pub id: AuthenticatorId,
    pub login_info: LoginInfo,
    #[serde(with = "time::serde::timestamp")]
    pub last_used_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "option_duration_secs", default)]
    pub idle_timeout: Option<Duration>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Authenticator for SessionAuthenticator {
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

/// Framework-session carrier. Always self-contained.
pub struct SessionAuthenticatorService {
    settings: SessionAuthenticatorSettings,
    codec: SignedJsonCodec,
    fingerprint_generator: Arc<dyn FingerprintGenerator>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl SessionAuthenticatorService {
    #[must_use]
    pub fn new(
        settings: SessionAuthenticatorSettings,
        codec: SignedJsonCodec,
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
    pub fn settings(&self) -> &SessionAuthenticatorSettings {
        &self.settings
    }

    fn serialize(&self, authenticator: &SessionAuthenticator) -> Result<String, CodecError> {
        self.codec.serialize(authenticator)
    }
}

impl AuthenticatorService for SessionAuthenticatorService {
    const ID: &'static str = "session-authenticator";

    type Authenticator = SessionAuthenticator;
    type Value = String;

    async fn create(
        &self,
        login_info: LoginInfo,
        request: &AuthRequest,
    ) -> Result<SessionAuthenticator, AuthenticatorError> {
        let id = self
            .id_generator
            .generate()
            .map_err(|e| AuthenticatorError::creation(Self::ID, e))?;
        let now = self.clock.now();
        let expires_at = expires_at(Self::ID, now, self.settings.authenticator_expiry)?;

        let authenticator = SessionAuthenticator {
            id: id.into(),
            login_info,
            last_used_at: now,
            expires_at,
            idle_timeout: self.settings.authenticator_idle_timeout,
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
    ) -> Result<Option<SessionAuthenticator>, AuthenticatorError> {
        let Some(raw) = request.session_value(&self.settings.session_key) else {
            return Ok(None);
        };
        let decoded = self
            .codec
            .unserialize::<SessionAuthenticator>(raw)
            .map(Some)
            .map_err(DecodeError::Codec);
        let Some(authenticator) = resolve_decoded(Self::ID, decoded)? else {
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

    async fn init(&self, authenticator: &SessionAuthenticator) -> Result<String, AuthenticatorError> {
        self.serialize(authenticator)
            .map_err(|e| AuthenticatorError::initialization(Self::ID, e))
    }

    fn embed(&self, value: String, response: AuthResponse) -> Result<AuthResponse, AuthenticatorError> {
        Ok(response.set_session_value(self.settings.session_key.clone(), value))
    }

    fn embed_into_request(
        &self,
        value: String,
        request: AuthRequest,
    ) -> Result<AuthRequest, AuthenticatorError> {
        Ok(request.with_session_value(self.settings.session_key.clone(), value))
    }

    fn touch(&self, authenticator: SessionAuthenticator) -> Touched<SessionAuthenticator> {
        super::touch(authenticator, self.clock.now())
    }

    async fn update(
        &self,
        authenticator: SessionAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        let value = self
            .serialize(&authenticator)
            .map_err(|e| AuthenticatorError::update(Self::ID, e))?;
        Ok(response.set_session_value(self.settings.session_key.clone(), value))
    }

    async fn renew_value(
        &self,
        authenticator: SessionAuthenticator,
        request: &AuthRequest,
    ) -> Result<String, AuthenticatorError> {
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
        authenticator: SessionAuthenticator,
        response: AuthResponse,
    ) -> Result<AuthResponse, AuthenticatorError> {
        tracing::debug!(
            carrier = Self::ID,
            authenticator_id = %authenticator.id,
            "Authenticator discarded"
        );
        Ok(response.remove_session_value(self.settings.session_key.clone()))
    }
}
