//! User repository
//!
//! [`UserStore`] is the contract the auth service relies on. The bundled
//! implementation keeps accounts in memory; any durable backend only needs
//! the same three lookups.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::db::models::Account;

/// User store error types
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("Username '{0}' is already taken")]
    UsernameAlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Credential store consumed by the auth service
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-sensitive lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, UserStoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, UserStoreError>;

    /// Insert a new account; fails if the username is taken
    async fn create(&self, username: &str, password_hash: &str)
    -> Result<Account, UserStoreError>;
}

/// In-memory user store backed by DashMap
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    accounts: DashMap<Uuid, Account>,
    by_username: DashMap<String, Uuid>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Remove an account (used when an account is deleted out from under a session)
    pub fn remove(&self, id: Uuid) -> Option<Account> {
        let (_, account) = self.accounts.remove(&id)?;
        self.by_username.remove(&account.username);
        Some(account)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, UserStoreError> {
        let Some(id) = self.by_username.get(username).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, UserStoreError> {
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Account, UserStoreError> {
        // The username index entry is held while inserting, so two concurrent
        // registrations of the same name cannot both succeed.
        match self.by_username.entry(username.to_string()) {
            Entry::Occupied(_) => Err(UserStoreError::UsernameAlreadyExists(username.to_string())),
            Entry::Vacant(slot) => {
                let account = Account::new(username, password_hash);
                self.accounts.insert(account.id, account.clone());
                slot.insert(account.id);
                Ok(account)
            }
        }
    }
}
