use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::authenticator::JwtAuthenticator;
use crate::config::JwtAuthenticatorSettings;
use crate::crypto::Crypter;
use crate::error::{CodecError, ConfigError};
use crate::types::LoginInfo;

/// Claim names the codec owns. Custom claims may not use them.
pub const RESERVED_CLAIMS: [&str; 5] = ["jti", "iss", "sub", "iat", "exp"];

/// Minimum shared secret length for HS256.
const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    jti: String,
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    custom: Map<String, Value>,
}

/// HS256 claim-token codec.
///
/// `iat` carries the last-used time and `exp` the absolute expiry, both as
/// whole Unix seconds. The login info travels in `sub`, encrypted with the
/// crypter unless subject encryption is turned off in the settings.
#[derive(Clone)]
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    crypter: Arc<dyn Crypter>,
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl JwtCodec {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the shared secret is shorter than 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>, crypter: Arc<dyn Crypter>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError(format!(
                "JWT secret too short: expected at least {MIN_SECRET_LENGTH} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            crypter,
        })
    }

    /// Signs the authenticator into a three-segment token.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ReservedClaimOverride`] before anything is
    /// signed if a custom claim reuses a reserved name.
    pub(crate) fn serialize(
        &self,
        authenticator: &JwtAuthenticator,
        settings: &JwtAuthenticatorSettings,
    ) -> Result<String, CodecError> {
        let custom = authenticator.custom_claims.clone().unwrap_or_default();
        if let Some(name) = RESERVED_CLAIMS.iter().find(|name| custom.contains_key(**name)) {
            return Err(CodecError::ReservedClaimOverride((*name).to_string()));
        }

        let claims = Claims {
            jti: authenticator.id.to_string(),
            iss: settings.issuer.clone(),
            sub: self.encode_subject(&authenticator.login_info, settings.encrypt_subject)?,
            iat: authenticator.last_used_at.unix_timestamp(),
            exp: authenticator.expires_at.unix_timestamp(),
            custom,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CodecError::InvalidFormat(e.to_string()))
    }

    /// Verifies and decodes a token issued by [`serialize`](Self::serialize).
    ///
    /// The MAC over `header.payload` is checked before either segment is
    /// parsed, so any altered byte is an [`CodecError::InvalidSignature`].
    /// Expiry is not checked here; the lifecycle checks it against its own
    /// clock. The idle timeout comes from the settings.
    pub(crate) fn unserialize(
        &self,
        token: &str,
        settings: &JwtAuthenticatorSettings,
    ) -> Result<JwtAuthenticator, CodecError> {
        self.verify_signature(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        Ok(JwtAuthenticator {
            id: claims.jti.into(),
            login_info: self.decode_subject(&claims.sub, settings.encrypt_subject)?,
            last_used_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
            idle_timeout: settings.authenticator_idle_timeout,
            custom_claims: (!claims.custom.is_empty()).then_some(claims.custom),
        })
    }

    fn verify_signature(&self, token: &str) -> Result<(), CodecError> {
        let (message, signature) = token
            .rsplit_once('.')
            .ok_or(CodecError::InvalidSignature)?;
        match jsonwebtoken::crypto::verify(
            signature,
            message.as_bytes(),
            &self.decoding_key,
            Algorithm::HS256,
        ) {
            Ok(true) => Ok(()),
            _ => Err(CodecError::InvalidSignature),
        }
    }

    fn encode_subject(&self, login_info: &LoginInfo, encrypt: bool) -> Result<String, CodecError> {
        let json =
            serde_json::to_string(login_info).map_err(|e| CodecError::InvalidFormat(e.to_string()))?;
        if encrypt {
            self.crypter.encrypt(&json)
        } else {
            Ok(URL_SAFE_NO_PAD.encode(json))
        }
    }

    fn decode_subject(&self, subject: &str, encrypted: bool) -> Result<LoginInfo, CodecError> {
        let json = if encrypted {
            self.crypter.decrypt(subject)?
        } else {
            let bytes = URL_SAFE_NO_PAD
                .decode(subject)
                .map_err(|e| CodecError::InvalidEncoding(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| CodecError::InvalidEncoding(e.to_string()))?
        };
        serde_json::from_str(&json).map_err(|e| CodecError::InvalidFormat(e.to_string()))
    }
}

fn timestamp(secs: i64) -> Result<OffsetDateTime, CodecError> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| CodecError::InvalidFormat(e.to_string()))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> CodecError {
    match e.kind() {
        ErrorKind::InvalidSignature => CodecError::InvalidSignature,
        ErrorKind::Base64(_) | ErrorKind::Utf8(_) => CodecError::InvalidEncoding(e.to_string()),
        _ => CodecError::InvalidFormat(e.to_string()),
    }
}
