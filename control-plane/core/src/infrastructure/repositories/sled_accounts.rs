// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! sled-backed UserDirectory.
//!
//! Two trees:
//!
//! - `accounts`: username → account JSON
//! - `data_plane_tokens`: token digest → username
//!
//! Every write touches both trees inside one multi-tree transaction, so a
//! token reissue drops the old index entry in the same commit that records
//! the new one. Field updates read the current record inside that same
//! transaction; sled retries the closure on conflict.

use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, Transactional,
};

use crate::domain::account::Account;
use crate::domain::repository::{AccountBatch, AccountOp, AccountRepository, AccountUpdate, RepositoryError};

const ACCOUNTS_TREE: &str = "accounts";
const TOKEN_INDEX_TREE: &str = "data_plane_tokens";

type TxResult<T> = Result<T, ConflictableTransactionError<RepositoryError>>;

/// Op with the account already serialised, so the transaction closure can be
/// retried without re-encoding.
enum PreparedOp {
    Put {
        username: String,
        bytes: Vec<u8>,
        digest: Option<String>,
    },
    Delete(String),
}

#[derive(Clone)]
pub struct SledAccountRepository {
    accounts: sled::Tree,
    token_index: sled::Tree,
}

impl SledAccountRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, RepositoryError> {
        Ok(Self {
            accounts: db.open_tree(ACCOUNTS_TREE)?,
            token_index: db.open_tree(TOKEN_INDEX_TREE)?,
        })
    }

    fn prepare(batch: &AccountBatch) -> Result<Vec<PreparedOp>, RepositoryError> {
        batch
            .ops()
            .iter()
            .map(|op| match op {
                AccountOp::Put(account) => Ok(PreparedOp::Put {
                    username: account.username.clone(),
                    bytes: serde_json::to_vec(account)?,
                    digest: account.data_plane_token_digest.clone(),
                }),
                AccountOp::Delete(username) => Ok(PreparedOp::Delete(username.clone())),
            })
            .collect()
    }

    fn commit(&self, ops: Vec<PreparedOp>) -> Result<(), RepositoryError> {
        let result = (&self.accounts, &self.token_index).transaction(|(accounts, index)| {
            for op in &ops {
                match op {
                    PreparedOp::Put { username, bytes, digest } => {
                        let previous = accounts.insert(username.as_bytes(), bytes.as_slice())?;
                        if let Some(old) = previous_digest(previous)? {
                            if digest.as_deref() != Some(old.as_str()) {
                                index.remove(old.as_bytes())?;
                            }
                        }
                        if let Some(digest) = digest {
                            index.insert(digest.as_bytes(), username.as_bytes())?;
                        }
                    }
                    PreparedOp::Delete(username) => {
                        let previous = accounts.remove(username.as_bytes())?;
                        remove_index_entry(index, previous_digest(previous)?)?;
                    }
                }
            }
            Ok(())
        });

        result.map_err(from_tx_error)
    }

    fn create_in_tx(&self, account: &Account) -> Result<bool, RepositoryError> {
        let bytes = serde_json::to_vec(account)?;
        let username = account.username.as_bytes();
        let result = (&self.accounts, &self.token_index).transaction(|(accounts, index)| -> TxResult<bool> {
            if accounts.get(username)?.is_some() {
                return Ok(false);
            }
            accounts.insert(username, bytes.as_slice())?;
            if let Some(digest) = &account.data_plane_token_digest {
                index.insert(digest.as_bytes(), username)?;
            }
            Ok(true)
        });
        result.map_err(from_tx_error)
    }

    fn update_in_tx(&self, username: &str, update: &AccountUpdate) -> Result<Option<Account>, RepositoryError> {
        let result = (&self.accounts, &self.token_index).transaction(|(accounts, index)| -> TxResult<Option<Account>> {
            let Some(bytes) = accounts.get(username.as_bytes())? else {
                return Ok(None);
            };
            let mut account: Account = serde_json::from_slice(&bytes).map_err(abort)?;
            let old_digest = account.data_plane_token_digest.clone();
            update.apply_to(&mut account);

            let encoded = serde_json::to_vec(&account).map_err(abort)?;
            accounts.insert(username.as_bytes(), encoded)?;
            if account.data_plane_token_digest != old_digest {
                remove_index_entry(index, old_digest)?;
                if let Some(digest) = &account.data_plane_token_digest {
                    index.insert(digest.as_bytes(), username.as_bytes())?;
                }
            }
            Ok(Some(account))
        });
        result.map_err(from_tx_error)
    }

    fn decode(bytes: &[u8]) -> Result<Account, RepositoryError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn abort(err: serde_json::Error) -> ConflictableTransactionError<RepositoryError> {
    ConflictableTransactionError::Abort(RepositoryError::from(err))
}

fn from_tx_error(err: TransactionError<RepositoryError>) -> RepositoryError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => RepositoryError::Database(e.to_string()),
    }
}

fn previous_digest(previous: Option<sled::IVec>) -> TxResult<Option<String>> {
    match previous {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice::<Account>(&bytes)
            .map(|a| a.data_plane_token_digest)
            .map_err(abort),
    }
}

fn remove_index_entry(index: &TransactionalTree, digest: Option<String>) -> TxResult<()> {
    if let Some(digest) = digest {
        index.remove(digest.as_bytes())?;
    }
    Ok(())
}

/// Run sled I/O off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, RepositoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RepositoryError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RepositoryError::Unknown(e.to_string()))?
}

#[async_trait]
impl AccountRepository for SledAccountRepository {
    async fn get(&self, username: &str) -> Result<Option<Account>, RepositoryError> {
        let repo = self.clone();
        let username = username.to_string();
        blocking(move || {
            repo.accounts
                .get(username.as_bytes())?
                .map(|bytes| Self::decode(&bytes))
                .transpose()
        })
        .await
    }

    async fn put(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut batch = AccountBatch::new();
        batch.put(account.clone());
        self.apply(batch).await
    }

    async fn create(&self, account: &Account) -> Result<bool, RepositoryError> {
        let repo = self.clone();
        let account = account.clone();
        blocking(move || {
            let created = repo.create_in_tx(&account)?;
            repo.accounts.flush()?;
            Ok(created)
        })
        .await
    }

    async fn update(&self, username: &str, update: AccountUpdate) -> Result<Option<Account>, RepositoryError> {
        let repo = self.clone();
        let username = username.to_string();
        blocking(move || {
            let updated = repo.update_in_tx(&username, &update)?;
            repo.accounts.flush()?;
            Ok(updated)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Account>, RepositoryError> {
        let repo = self.clone();
        blocking(move || {
            repo.accounts
                .iter()
                .values()
                .map(|bytes| Self::decode(&bytes?))
                .collect()
        })
        .await
    }

    async fn delete(&self, username: &str) -> Result<(), RepositoryError> {
        let mut batch = AccountBatch::new();
        batch.delete(username);
        self.apply(batch).await
    }

    async fn apply(&self, batch: AccountBatch) -> Result<(), RepositoryError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = Self::prepare(&batch)?;
        let repo = self.clone();
        blocking(move || {
            repo.commit(ops)?;
            repo.accounts.flush()?;
            Ok(())
        })
        .await
    }

    async fn find_by_data_plane_token(&self, digest: &str) -> Result<Option<Account>, RepositoryError> {
        let repo = self.clone();
        let digest = digest.to_string();
        blocking(move || {
            let Some(username) = repo.token_index.get(digest.as_bytes())? else {
                return Ok(None);
            };
            let account = repo
                .accounts
                .get(&username)?
                .map(|bytes| Self::decode(&bytes))
                .transpose()?;
            // Stale index entries are treated as absent.
            Ok(account.filter(|a| a.data_plane_token_digest.as_deref() == Some(digest.as_str())))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_repo() -> SledAccountRepository {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledAccountRepository::from_db(&db).unwrap()
    }

    fn with_token(mut account: Account, digest: &str) -> Account {
        account.data_plane_token_digest = Some(digest.to_string());
        account
    }

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let repo = temp_repo();
        repo.put(&Account::local("bob", "read", "h".into())).await.unwrap();
        repo.put(&Account::github("alice", "write", "gho_x".into())).await.unwrap();

        let alice = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(alice.role, "write");

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|a| a.username).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        repo.delete("bob").await.unwrap();
        assert!(repo.get("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_reissue_drops_old_index_entry() {
        let repo = temp_repo();
        let account = Account::local("alice", "read", "h".into());
        repo.put(&with_token(account.clone(), "old")).await.unwrap();
        assert!(repo.find_by_data_plane_token("old").await.unwrap().is_some());

        repo.put(&with_token(account, "new")).await.unwrap();
        assert!(repo.find_by_data_plane_token("old").await.unwrap().is_none());
        assert_eq!(
            repo.find_by_data_plane_token("new").await.unwrap().unwrap().username,
            "alice"
        );
    }

    #[tokio::test]
    async fn test_batch_is_applied_together() {
        let repo = temp_repo();
        repo.put(&with_token(Account::local("carol", "read", "h".into()), "c")).await.unwrap();

        let mut batch = AccountBatch::new();
        batch
            .put(Account::local("alice", "read", "h1".into()))
            .put(Account::local("bob", "read", "h2".into()))
            .delete("carol");
        repo.apply(batch).await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|a| a.username).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(repo.find_by_data_plane_token("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_field_update_keeps_concurrently_issued_token() {
        let repo = temp_repo();
        repo.put(&with_token(Account::github("octocat", "read", "gho_old".into()), "old"))
            .await
            .unwrap();
        let stale = repo.get("octocat").await.unwrap().unwrap();

        repo.update("octocat", AccountUpdate::DataPlaneTokenDigest("new".into()))
            .await
            .unwrap()
            .unwrap();
        // A writer still holding the stale copy only changes its own field.
        assert_eq!(stale.data_plane_token_digest.as_deref(), Some("old"));
        repo.update("octocat", AccountUpdate::GitHubToken("gho_new".into()))
            .await
            .unwrap()
            .unwrap();

        assert!(repo.find_by_data_plane_token("old").await.unwrap().is_none());
        let found = repo.find_by_data_plane_token("new").await.unwrap().unwrap();
        assert_eq!(found.github_token.as_deref(), Some("gho_new"));
    }

    #[tokio::test]
    async fn test_create_and_update_missing() {
        let repo = temp_repo();
        let account = with_token(Account::local("alice", "read", "h".into()), "a");
        assert!(repo.create(&account).await.unwrap());
        assert!(!repo.create(&Account::local("alice", "admin", "h".into())).await.unwrap());
        assert_eq!(repo.get("alice").await.unwrap().unwrap().role, "read");
        assert!(repo.find_by_data_plane_token("a").await.unwrap().is_some());

        assert!(repo.update("nobody", AccountUpdate::Role("write".into())).await.unwrap().is_none());
    }
}
