use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::{ItemStructure, PublishableStateItemHandler, StateItem, StateItemHandler};
use crate::config::CsrfStateSettings;
use crate::cookies;
use crate::crypto::Signer;
use crate::error::StateError;
use crate::http::{AuthRequest, AuthResponse};
use crate::id::IdGenerator;

const ID: &str = "csrf-state";

/// Random token binding the `state` parameter to the browser that started
/// the redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfStateItem {
    pub token: String,
}

/// Issues a [`CsrfStateItem`] and mirrors it in a signed cookie.
///
/// A callback is only accepted when the `state` parameter and the cookie
/// carry the same token.
pub struct CsrfStateItemHandler {
    settings: CsrfStateSettings,
    id_generator: Arc<dyn IdGenerator>,
    signer: Arc<dyn Signer>,
}

impl CsrfStateItemHandler {
    #[must_use]
    pub fn new(
        settings: CsrfStateSettings,
        id_generator: Arc<dyn IdGenerator>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            settings,
            id_generator,
            signer,
        }
    }

    /// Expires the companion cookie, typically once the callback is done.
    #[must_use]
    pub fn discard(&self, response: AuthResponse) -> AuthResponse {
        response.remove_cookie(cookies::removal(self.settings.cookie_spec()))
    }

    fn cookie_token(&self, request: &AuthRequest) -> Option<String> {
        let raw = request.cookie(self.settings.cookie_name())?;
        match self.signer.extract(raw) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "CSRF state cookie failed verification");
                None
            }
        }
    }
}

impl std::fmt::Debug for CsrfStateItemHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfStateItemHandler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StateItemHandler for CsrfStateItemHandler {
    fn item(&self) -> Result<Arc<dyn StateItem>, StateError> {
        let token = self
            .id_generator
            .generate()
            .map_err(StateError::ItemGeneration)?;
        Ok(Arc::new(CsrfStateItem { token }))
    }

    fn can_handle_item(&self, item: &dyn StateItem) -> bool {
        item.as_any().is::<CsrfStateItem>()
    }

    fn can_handle_structure(&self, structure: &ItemStructure, request: &AuthRequest) -> bool {
        if structure.id != ID {
            return false;
        }
        let Ok(item) = serde_json::from_value::<CsrfStateItem>(structure.data.clone()) else {
            return false;
        };
        let Some(cookie_token) = self.cookie_token(request) else {
            tracing::debug!("CSRF state cookie missing");
            return false;
        };
        let matches: bool = cookie_token.as_bytes().ct_eq(item.token.as_bytes()).into();
        if !matches {
            tracing::warn!("CSRF state token does not match its cookie");
        }
        matches
    }

    fn serialize(&self, item: &dyn StateItem) -> Result<ItemStructure, StateError> {
        let item = item
            .as_any()
            .downcast_ref::<CsrfStateItem>()
            .ok_or_else(|| StateError::MissingItemHandler(format!("{item:?}")))?;
        Ok(ItemStructure::new(ID, serde_json::to_value(item)?))
    }

    fn unserialize(
        &self,
        structure: &ItemStructure,
        _request: &AuthRequest,
    ) -> Result<Arc<dyn StateItem>, StateError> {
        let item: CsrfStateItem = serde_json::from_value(structure.data.clone())?;
        Ok(Arc::new(item))
    }

    fn as_publishable(&self) -> Option<&dyn PublishableStateItemHandler> {
        Some(self)
    }
}

impl PublishableStateItemHandler for CsrfStateItemHandler {
    fn publish(&self, item: &dyn StateItem, response: AuthResponse) -> AuthResponse {
        match item.as_any().downcast_ref::<CsrfStateItem>() {
            Some(item) => response.set_cookie(cookies::build(
                self.settings.cookie_spec(),
                self.signer.sign(&item.token),
            )),
            None => response,
        }
    }
}
