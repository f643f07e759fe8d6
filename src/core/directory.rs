//! User directory
//!
//! Maps marketplace usernames to the accounts that pay and get paid on
//! their behalf.

use crate::store::{self, DocumentStore};
use crate::types::{AccountId, Entity, LedgerError, User};
use std::sync::Arc;

/// Username to account resolution
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Bind `username` to an existing account
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account does not exist
    /// - `AlreadyExists` if the username is taken
    pub fn register(&self, username: &str, account: &str) -> Result<User, LedgerError> {
        let store = self.store.as_ref();
        if store.find_one(Entity::Account, account)?.is_none() {
            return Err(LedgerError::not_found(Entity::Account, account));
        }

        let user = User {
            username: username.to_string(),
            account: account.to_string(),
        };
        store::insert(store, Entity::User, username, &user)?;
        tracing::debug!(username, account, "user registered");
        Ok(user)
    }

    /// Account of a registered user
    pub fn account_of(&self, username: &str) -> Result<AccountId, LedgerError> {
        let user: User = store::fetch_required(self.store.as_ref(), Entity::User, username)?.value;
        Ok(user.account)
    }
}
