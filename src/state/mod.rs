//! Signed state carried through an OAuth-style redirect.
//!
//! Each registered [`StateItemHandler`] contributes one item when the
//! redirect starts. The items are serialized into one signed value sent
//! as the `state` parameter, and the provider echoes it back on the
//! callback, where every fragment must be claimed by a handler again.
//!
//! ```rust,ignore
//! let handler = SocialStateHandler::new(signer)
//!     .with_handler(Arc::new(CsrfStateItemHandler::new(settings, ids, signer)))
//!     .with_handler(Arc::new(UserStateItemHandler::new(redirect_intent)));
//!
//! // login
//! let response = handler.authorization_redirect(provider_url, AuthResponse::new())?;
//!
//! // callback
//! let state = handler.unserialize(&params.state, &request)?;
//! let intent = state.get::<RedirectIntent>();
//! ```

mod csrf;
mod user;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use url::Url;

use crate::crypto::Signer;
use crate::error::StateError;
use crate::http::{AuthRequest, AuthResponse};

pub use csrf::{CsrfStateItem, CsrfStateItemHandler};
pub use user::UserStateItemHandler;

const ITEM_SEPARATOR: &str = ".";
const STRUCTURE_SEPARATOR: char = '-';

/// A value carried in the social state.
///
/// Implemented for every `Debug + PartialEq + Send + Sync + 'static` type.
pub trait StateItem: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn StateItem) -> bool;
}

impl<T> StateItem for T
where
    T: Any + Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn StateItem) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

/// The items of one redirect.
#[derive(Debug, Clone, Default)]
pub struct SocialState {
    items: Vec<Arc<dyn StateItem>>,
}

impl SocialState {
    #[must_use]
    pub fn new(items: Vec<Arc<dyn StateItem>>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[Arc<dyn StateItem>] {
        &self.items
    }

    /// First item of type `T`.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.items
            .iter()
            .find_map(|item| item.as_ref().as_any().downcast_ref::<T>())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for SocialState {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.as_ref().dyn_eq(b.as_ref()))
    }
}

/// Tagged wire form of one item: `<base64(id)>-<base64(json)>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStructure {
    pub id: String,
    pub data: serde_json::Value,
}

impl ItemStructure {
    #[must_use]
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    fn encode(&self) -> String {
        format!(
            "{}{STRUCTURE_SEPARATOR}{}",
            STANDARD_NO_PAD.encode(&self.id),
            STANDARD_NO_PAD.encode(self.data.to_string())
        )
    }

    fn decode(raw: &str) -> Result<Self, StateError> {
        let (id, data) = raw
            .split_once(STRUCTURE_SEPARATOR)
            .ok_or_else(|| StateError::InvalidFormat("item structure without separator".into()))?;
        let id = decode_part(id)?;
        let data = serde_json::from_str(&decode_part(data)?)?;
        Ok(Self { id, data })
    }
}

fn decode_part(part: &str) -> Result<String, StateError> {
    let bytes = STANDARD_NO_PAD
        .decode(part)
        .map_err(|e| StateError::InvalidFormat(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StateError::InvalidFormat(e.to_string()))
}

/// Owns one kind of state item.
pub trait StateItemHandler: Send + Sync {
    /// Produces this handler's item for a new redirect.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ItemGeneration`] if the item cannot be produced.
    fn item(&self) -> Result<Arc<dyn StateItem>, StateError>;

    fn can_handle_item(&self, item: &dyn StateItem) -> bool;

    /// Whether a structure read back from a callback belongs to this
    /// handler. May consult the request (e.g. a companion cookie).
    fn can_handle_structure(&self, structure: &ItemStructure, request: &AuthRequest) -> bool;

    /// # Errors
    ///
    /// Fails if the item is not one this handler owns or cannot be encoded.
    fn serialize(&self, item: &dyn StateItem) -> Result<ItemStructure, StateError>;

    /// # Errors
    ///
    /// Fails if the structure's data does not decode into this handler's item.
    fn unserialize(
        &self,
        structure: &ItemStructure,
        request: &AuthRequest,
    ) -> Result<Arc<dyn StateItem>, StateError>;

    fn as_publishable(&self) -> Option<&dyn PublishableStateItemHandler> {
        None
    }
}

/// A handler that also writes to the response when the state is issued.
pub trait PublishableStateItemHandler: StateItemHandler {
    fn publish(&self, item: &dyn StateItem, response: AuthResponse) -> AuthResponse;
}

/// Builds, signs and validates the social state.
///
/// Cheap to clone. [`with_handler`](Self::with_handler) returns a new
/// handler set and leaves the original untouched.
#[derive(Clone)]
pub struct SocialStateHandler {
    handlers: Arc<[Arc<dyn StateItemHandler>]>,
    signer: Arc<dyn Signer>,
}

impl Debug for SocialStateHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialStateHandler")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl SocialStateHandler {
    /// A handler set with no item handlers. Until one is added, callbacks
    /// are not validated at all.
    #[must_use]
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            handlers: Arc::from(Vec::new()),
            signer,
        }
    }

    #[must_use]
    pub fn with_handler(&self, handler: Arc<dyn StateItemHandler>) -> Self {
        let mut handlers = self.handlers.to_vec();
        handlers.push(handler);
        Self {
            handlers: handlers.into(),
            signer: Arc::clone(&self.signer),
        }
    }

    /// One fresh item from each registered handler.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure.
    pub fn state(&self) -> Result<SocialState, StateError> {
        let items = self
            .handlers
            .iter()
            .map(|handler| handler.item())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SocialState::new(items))
    }

    /// Signed wire value of `state`; the empty string for an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MissingItemHandler`] if an item has no handler.
    pub fn serialize(&self, state: &SocialState) -> Result<String, StateError> {
        if state.is_empty() {
            return Ok(String::new());
        }

        let structures = state
            .items()
            .iter()
            .map(|item| {
                let item = item.as_ref();
                let handler = self
                    .handlers
                    .iter()
                    .find(|handler| handler.can_handle_item(item))
                    .ok_or_else(|| StateError::MissingItemHandler(format!("{item:?}")))?;
                Ok(handler.serialize(item)?.encode())
            })
            .collect::<Result<Vec<_>, StateError>>()?;

        Ok(self.signer.sign(&structures.join(ITEM_SEPARATOR)))
    }

    /// Validates a `state` value echoed back on the callback.
    ///
    /// With no handlers registered this always succeeds with an empty state.
    ///
    /// # Errors
    ///
    /// - [`StateError::InvalidSignature`] if the value was not signed here
    /// - [`StateError::InvalidFormat`] if a fragment is malformed
    /// - [`StateError::MissingItemHandler`] if no handler claims a fragment
    pub fn unserialize(&self, raw: &str, request: &AuthRequest) -> Result<SocialState, StateError> {
        if self.handlers.is_empty() {
            return Ok(SocialState::default());
        }

        let joined = self.signer.extract(raw)?;
        let items = joined
            .split(ITEM_SEPARATOR)
            .map(|fragment| {
                let structure = ItemStructure::decode(fragment)?;
                let handler = self
                    .handlers
                    .iter()
                    .find(|handler| handler.can_handle_structure(&structure, request))
                    .ok_or_else(|| StateError::MissingItemHandler(structure.id.clone()))?;
                handler.unserialize(&structure, request)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SocialState::new(items))
    }

    /// Lets publishable handlers write to the response for their items.
    #[must_use]
    pub fn publish(&self, state: &SocialState, response: AuthResponse) -> AuthResponse {
        state.items().iter().fold(response, |response, item| {
            let item = item.as_ref();
            match self
                .handlers
                .iter()
                .filter_map(|handler| handler.as_publishable())
                .find(|handler| handler.can_handle_item(item))
            {
                Some(handler) => handler.publish(item, response),
                None => response,
            }
        })
    }

    /// Starts a redirect to `authorization_url` carrying fresh state.
    ///
    /// Builds the state, publishes it, appends it as the `state` query
    /// parameter and sets the redirect target.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or the state cannot be built.
    pub fn authorization_redirect(
        &self,
        authorization_url: &str,
        response: AuthResponse,
    ) -> Result<AuthResponse, StateError> {
        let mut url = Url::parse(authorization_url)?;
        let state = self.state()?;
        let serialized = self.serialize(&state)?;
        if !serialized.is_empty() {
            url.query_pairs_mut().append_pair("state", &serialized);
        }
        tracing::debug!(items = state.items().len(), "Redirecting with social state");
        Ok(self.publish(&state, response).redirect_to(url))
    }
}
