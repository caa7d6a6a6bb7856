use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Reference to the authenticated principal: the provider that vouched for
/// the identity and the key that provider uses for it.
///
/// Opaque to this crate. It is only carried, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{provider_id}:{provider_key}")]
pub struct LoginInfo {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "providerKey")]
    pub provider_key: String,
}

impl LoginInfo {
    #[must_use]
    pub fn new(provider_id: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_key: provider_key.into(),
        }
    }
}

/// Authenticator identifier, unique per issued authenticator.
///
/// For store-backed carriers this is also the wire value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct AuthenticatorId(pub String);

impl AuthenticatorId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AuthenticatorId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Serializes an optional [`time::Duration`] as whole seconds.
pub(crate) mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub(crate) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.whole_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(deserializer)?.map(Duration::seconds))
    }
}
