use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Boxed error used at the seams where collaborators (repositories, ID
/// generators) report failures of their own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the signing/encoding pipeline that turns an authenticator
/// into a wire value and back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A custom claim tried to replace one of the reserved claim-token claims.
    #[error("custom claim `{0}` overrides a reserved claim")]
    ReservedClaimOverride(String),
}

/// Lifecycle phase in which an [`AuthenticatorError`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Phase {
    #[display("create")]
    Creation,
    #[display("retrieve")]
    Retrieval,
    #[display("initialize")]
    Initialization,
    #[display("update")]
    Update,
    #[display("renew")]
    Renewal,
    #[display("discard")]
    Discard,
}

/// Carrier- and phase-qualified lifecycle failure.
///
/// The original cause is kept as the error source so the integrating
/// application can log the full chain.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthenticatorError {
    #[error("[{carrier}] could not create authenticator")]
    Creation {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("[{carrier}] could not retrieve authenticator")]
    Retrieval {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("[{carrier}] could not initialize authenticator")]
    Initialization {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("[{carrier}] could not update authenticator")]
    Update {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("[{carrier}] could not renew authenticator")]
    Renewal {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("[{carrier}] could not discard authenticator")]
    Discard {
        carrier: &'static str,
        #[source]
        source: BoxError,
    },
}

impl AuthenticatorError {
    pub(crate) fn creation(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Creation {
            carrier,
            source: source.into(),
        }
    }

    pub(crate) fn retrieval(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Retrieval {
            carrier,
            source: source.into(),
        }
    }

    pub(crate) fn initialization(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Initialization {
            carrier,
            source: source.into(),
        }
    }

    pub(crate) fn update(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Update {
            carrier,
            source: source.into(),
        }
    }

    pub(crate) fn renewal(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Renewal {
            carrier,
            source: source.into(),
        }
    }

    pub(crate) fn discard(carrier: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Discard {
            carrier,
            source: source.into(),
        }
    }

    /// Identifier of the carrier that failed.
    #[must_use]
    pub fn carrier(&self) -> &'static str {
        match self {
            Self::Creation { carrier, .. }
            | Self::Retrieval { carrier, .. }
            | Self::Initialization { carrier, .. }
            | Self::Update { carrier, .. }
            | Self::Renewal { carrier, .. }
            | Self::Discard { carrier, .. } => *carrier,
        }
    }

    /// Lifecycle phase that failed.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Creation { .. } => Phase::Creation,
            Self::Retrieval { .. } => Phase::Retrieval,
            Self::Initialization { .. } => Phase::Initialization,
            Self::Update { .. } => Phase::Update,
            Self::Renewal { .. } => Phase::Renewal,
            Self::Discard { .. } => Phase::Discard,
        }
    }
}

impl IntoResponse for AuthenticatorError {
    fn into_response(self) -> Response {
        let cause = std::error::Error::source(&self).map(ToString::to_string);
        tracing::error!(
            carrier = self.carrier(),
            phase = %self.phase(),
            cause = cause.as_deref().unwrap_or("unknown"),
            "Authenticator lifecycle error"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
    }
}

/// Social-state failures. Never downgraded: unrecognized redirect state is
/// treated as tampering.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StateError {
    #[error("social state signature is invalid")]
    InvalidSignature,

    #[error("malformed social state: {0}")]
    InvalidFormat(String),

    /// No registered handler claims the item or its serialized structure.
    #[error("no state item handler for `{0}`")]
    MissingItemHandler(String),

    #[error("could not produce state item")]
    ItemGeneration(#[source] BoxError),

    #[error("state item serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid authorization URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<CodecError> for StateError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidSignature => Self::InvalidSignature,
            other => Self::InvalidFormat(other.to_string()),
        }
    }
}

impl IntoResponse for StateError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Social state rejected");
        (StatusCode::FORBIDDEN, "Invalid state").into_response()
    }
}

/// Invalid configuration or key material.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);
