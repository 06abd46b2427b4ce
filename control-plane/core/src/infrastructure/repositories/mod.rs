// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of [`AccountRepository`], the UserDirectory.
//!
//! # Available Implementations
//!
//! - **SledAccountRepository** - embedded sled database; accounts plus a
//!   data-plane token index, written together in one transaction
//! - **InMemoryAccountRepository** - `BTreeMap` behind a single lock, for
//!   tests and `auth.type: none` deployments
//!
//! # Usage
//!
//! ```no_run
//! use gemward_core::infrastructure::repositories::SledAccountRepository;
//! use gemward_core::domain::repository::AccountRepository;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repo = SledAccountRepository::open("/var/lib/gemward/accounts")?;
//! let admin = repo.get("admin").await?;
//! # Ok(())
//! # }
//! ```

pub mod sled_accounts;

pub use sled_accounts::SledAccountRepository;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::account::Account;
use crate::domain::repository::{AccountBatch, AccountOp, AccountRepository, AccountUpdate, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryAccountRepository {
    accounts: Arc<RwLock<BTreeMap<String, Account>>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn get(&self, username: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self.accounts.read().get(username).cloned())
    }

    async fn put(&self, account: &Account) -> Result<(), RepositoryError> {
        self.accounts
            .write()
            .insert(account.username.clone(), account.clone());
        Ok(())
    }

    async fn create(&self, account: &Account) -> Result<bool, RepositoryError> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.username) {
            return Ok(false);
        }
        accounts.insert(account.username.clone(), account.clone());
        Ok(true)
    }

    async fn update(&self, username: &str, update: AccountUpdate) -> Result<Option<Account>, RepositoryError> {
        let mut accounts = self.accounts.write();
        Ok(accounts.get_mut(username).map(|account| {
            update.apply_to(account);
            account.clone()
        }))
    }

    async fn list(&self) -> Result<Vec<Account>, RepositoryError> {
        Ok(self.accounts.read().values().cloned().collect())
    }

    async fn delete(&self, username: &str) -> Result<(), RepositoryError> {
        self.accounts.write().remove(username);
        Ok(())
    }

    async fn apply(&self, batch: AccountBatch) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write();
        for op in batch.ops() {
            match op {
                AccountOp::Put(account) => {
                    accounts.insert(account.username.clone(), account.clone());
                }
                AccountOp::Delete(username) => {
                    accounts.remove(username);
                }
            }
        }
        Ok(())
    }

    async fn find_by_data_plane_token(&self, digest: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .accounts
            .read()
            .values()
            .find(|a| a.data_plane_token_digest.as_deref() == Some(digest))
            .cloned())
    }
}
