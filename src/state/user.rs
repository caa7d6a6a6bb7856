use std::any::{Any, type_name};
use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ItemStructure, StateItem, StateItemHandler};
use crate::error::StateError;
use crate::http::AuthRequest;

const ID_PREFIX: &str = "user-state";

/// Carries an application value through the redirect, e.g. the page to
/// return to after login.
///
/// The value is signed with the rest of the state but not encrypted.
/// Structures are tagged `user-state:<type name>` so handlers for different
/// types never claim each other's fragments. Use [`with_id`](Self::with_id)
/// for a tag that survives renaming the type.
#[derive(Debug, Clone)]
pub struct UserStateItemHandler<T> {
    id: String,
    item: T,
}

impl<T> UserStateItemHandler<T>
where
    T: Any + Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync,
{
    #[must_use]
    pub fn new(item: T) -> Self {
        Self {
            id: format!("{ID_PREFIX}:{}", type_name::<T>()),
            item,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl AsRef<str>) -> Self {
        self.id = format!("{ID_PREFIX}:{}", id.as_ref());
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T> StateItemHandler for UserStateItemHandler<T>
where
    T: Any + Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync,
{
    fn item(&self) -> Result<Arc<dyn StateItem>, StateError> {
        Ok(Arc::new(self.item.clone()))
    }

    fn can_handle_item(&self, item: &dyn StateItem) -> bool {
        item.as_any().is::<T>()
    }

    fn can_handle_structure(&self, structure: &ItemStructure, _request: &AuthRequest) -> bool {
        structure.id == self.id && serde_json::from_value::<T>(structure.data.clone()).is_ok()
    }

    fn serialize(&self, item: &dyn StateItem) -> Result<ItemStructure, StateError> {
        let item = item
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| StateError::MissingItemHandler(format!("{item:?}")))?;
        Ok(ItemStructure::new(self.id.clone(), serde_json::to_value(item)?))
    }

    fn unserialize(
        &self,
        structure: &ItemStructure,
        _request: &AuthRequest,
    ) -> Result<Arc<dyn StateItem>, StateError> {
        let item: T = serde_json::from_value(structure.data.clone())?;
        Ok(Arc::new(item))
    }
}
