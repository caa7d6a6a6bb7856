use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::authenticator::Authenticator;
use crate::error::BoxError;
use crate::types::AuthenticatorId;

/// Consumer-provided authenticator persistence for store-backed carriers.
///
/// Authenticators are keyed by their [`AuthenticatorId`]. Consistency
/// across nodes sharing a store is whatever the store itself guarantees.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl AuthenticatorRepository<CookieAuthenticator> for PgRepository {
///     async fn find(&self, id: &AuthenticatorId) -> Result<Option<CookieAuthenticator>, BoxError> {
///         self.db.find_authenticator(id.as_str()).await.map_err(Into::into)
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait AuthenticatorRepository<A: Authenticator>: Send + Sync {
    /// Look up an authenticator by ID.
    async fn find(&self, id: &AuthenticatorId) -> Result<Option<A>, BoxError>;

    /// Persist a new authenticator. Returns the stored authenticator.
    async fn add(&self, authenticator: A) -> Result<A, BoxError>;

    /// Replace a stored authenticator. Returns the stored authenticator.
    async fn update(&self, authenticator: A) -> Result<A, BoxError>;

    /// Delete an authenticator. Deleting an unknown ID is not an error.
    async fn remove(&self, id: &AuthenticatorId) -> Result<(), BoxError>;
}

/// Process-local repository for single-node deployments and tests.
#[derive(Debug)]
pub struct InMemoryAuthenticatorRepository<A> {
    entries: RwLock<HashMap<AuthenticatorId, A>>,
}

impl<A> InMemoryAuthenticatorRepository<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored authenticators.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<A> Default for InMemoryAuthenticatorRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Authenticator> AuthenticatorRepository<A> for InMemoryAuthenticatorRepository<A> {
    async fn find(&self, id: &AuthenticatorId) -> Result<Option<A>, BoxError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn add(&self, authenticator: A) -> Result<A, BoxError> {
        self.entries
            .write()
            .await
            .insert(authenticator.id().clone(), authenticator.clone());
        Ok(authenticator)
    }

    async fn update(&self, authenticator: A) -> Result<A, BoxError> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(authenticator.id()) {
            return Err(format!("authenticator {} is not stored", authenticator.id()).into());
        }
        entries.insert(authenticator.id().clone(), authenticator.clone());
        Ok(authenticator)
    }

    async fn remove(&self, id: &AuthenticatorId) -> Result<(), BoxError> {
        self.entries.write().await.remove(id);
        Ok(())
    }
}
