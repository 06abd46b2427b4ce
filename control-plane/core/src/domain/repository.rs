// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Account Repository (UserDirectory)
//!
//! Persistence contract for [`Account`] records, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Implementation | Backing | Use |
//! |----------------|---------|-----|
//! | `InMemoryAccountRepository` | `BTreeMap` under one lock | tests, `auth.type: none` |
//! | `SledAccountRepository` | sled trees + transaction | production |
//!
//! Multi-key writes go through [`AccountRepository::apply`]: every operation
//! in an [`AccountBatch`] commits together or not at all. Changes to a single
//! field of an existing account go through [`AccountRepository::update`],
//! which reads and rewrites the record in one step so concurrent changes to
//! other fields are never overwritten with a stale copy.

use async_trait::async_trait;

use crate::domain::account::Account;

/// Field-scoped change to a stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountUpdate {
    Role(String),
    GitHubToken(String),
    /// Replaces the active data-plane token; the previous one stops working
    DataPlaneTokenDigest(String),
}

impl AccountUpdate {
    pub fn apply_to(&self, account: &mut Account) {
        match self {
            Self::Role(role) => account.role = role.clone(),
            Self::GitHubToken(token) => account.github_token = Some(token.clone()),
            Self::DataPlaneTokenDigest(digest) => account.data_plane_token_digest = Some(digest.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountOp {
    Put(Account),
    Delete(String),
}

/// Ordered set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountBatch {
    ops: Vec<AccountOp>,
}

impl AccountBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, account: Account) -> &mut Self {
        self.ops.push(AccountOp::Put(account));
        self
    }

    pub fn delete(&mut self, username: impl Into<String>) -> &mut Self {
        self.ops.push(AccountOp::Delete(username.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[AccountOp] {
        &self.ops
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find account by username
    async fn get(&self, username: &str) -> Result<Option<Account>, RepositoryError>;

    /// Save account (create or update)
    async fn put(&self, account: &Account) -> Result<(), RepositoryError>;

    /// Insert `account` unless the username is taken. Returns whether it
    /// was inserted.
    async fn create(&self, account: &Account) -> Result<bool, RepositoryError>;

    /// Apply `update` to the stored account as one atomic read-modify-write.
    /// Returns the updated account, or `None` if it does not exist.
    async fn update(&self, username: &str, update: AccountUpdate) -> Result<Option<Account>, RepositoryError>;

    /// List all accounts, ordered by username
    async fn list(&self) -> Result<Vec<Account>, RepositoryError>;

    /// Delete account by username. Deleting a missing account is not an error.
    async fn delete(&self, username: &str) -> Result<(), RepositoryError>;

    /// Commit every operation in `batch` atomically
    async fn apply(&self, batch: AccountBatch) -> Result<(), RepositoryError>;

    /// Find the account whose active data-plane token has this digest
    async fn find_by_data_plane_token(&self, digest: &str) -> Result<Option<Account>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sled::Error> for RepositoryError {
    fn from(err: sled::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
