// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Local Password Authentication
//!
//! Username/password login against bcrypt hashes in the UserDirectory, with
//! session tokens issued by the injected [`SessionCodec`].
//!
//! Also owns two startup routines:
//!
//! - **Admin bootstrap** ([`LocalPasswordAuth::bootstrap_admin`]): make sure
//!   an `admin` account exists. A supplied password that no longer matches
//!   the stored hash rotates it. With no supplied password and no admin, a
//!   random one is generated and logged exactly once.
//! - **Bulk provisioning** ([`LocalPasswordAuth::provision`]): reconcile
//!   local accounts against a declared `username:password` list in one
//!   atomic batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;

use crate::domain::account::{Account, AccountType, ADMIN_ROLE, ADMIN_USERNAME};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::repository::{AccountBatch, AccountRepository};
use crate::domain::session::{IssuedSession, SessionClaims, SessionCodec};
use crate::infrastructure::password::{generate_password, generate_token, BcryptHasher};

const GENERATED_PASSWORD_LEN: usize = 32;
const GENERATED_PASSWORD_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Admin existed and the supplied password (if any) already matched.
    Unchanged,
    /// Admin existed; its password was rotated to the supplied one.
    Rotated,
    /// Admin created with the supplied password.
    Created,
    /// Admin created with a generated password, which has been logged.
    Generated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub upserted: Vec<String>,
    pub removed: Vec<String>,
}

/// One declared `username:password` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredUser {
    pub username: String,
    pub password: String,
}

impl DeclaredUser {
    /// Split on the first `:`; the password may itself contain colons.
    pub fn parse(pair: &str) -> GatewayResult<Self> {
        let (username, password) = pair.trim().split_once(':').ok_or_else(|| {
            GatewayError::Configuration("local user entries must be 'username:password'".to_string())
        })?;
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(GatewayError::Configuration(
                "local user entries need a non-empty username and password".to_string(),
            ));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

pub struct LocalPasswordAuth {
    accounts: Arc<dyn AccountRepository>,
    codec: Arc<dyn SessionCodec>,
    hasher: BcryptHasher,
    provisioned_role: String,
    /// Stand-in hash at the configured cost, verified against when there is
    /// no stored hash so every login attempt pays for one bcrypt check.
    absent_hash: OnceCell<String>,
}

impl LocalPasswordAuth {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        codec: Arc<dyn SessionCodec>,
        hasher: BcryptHasher,
        provisioned_role: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            codec,
            hasher,
            provisioned_role: provisioned_role.into(),
            absent_hash: OnceCell::new(),
        }
    }

    /// Unknown user, wrong password and password-less account all produce
    /// the same `AuthenticationFailed`.
    pub async fn login(&self, username: &str, password: &str) -> GatewayResult<IssuedSession> {
        let account = self.accounts.get(username).await?;
        let (hash, has_hash) = match account.as_ref().and_then(|a| a.password_hash.clone()) {
            Some(hash) => (hash, true),
            None => (self.absent_hash().await?, false),
        };

        let verified = self.hasher.verify_blocking(password.to_string(), hash).await && has_hash;

        match account {
            Some(account) if verified => {
                let claims = SessionClaims::new(account.username, account.role);
                Ok(self.codec.issue(&claims, Utc::now())?)
            }
            _ => {
                metrics::counter!("gemward_auth_failures_total", "strategy" => "local").increment(1);
                tracing::warn!(username, "Local login failed");
                Err(GatewayError::AuthenticationFailed)
            }
        }
    }

    async fn absent_hash(&self) -> GatewayResult<String> {
        self.absent_hash
            .get_or_try_init(|| self.hasher.hash_blocking(generate_token(GENERATED_PASSWORD_LEN)))
            .await
            .cloned()
    }

    pub fn refresh(&self, token: &str) -> GatewayResult<IssuedSession> {
        self.codec.refresh(token, Utc::now()).map_err(|e| {
            metrics::counter!("gemward_auth_failures_total", "strategy" => "local").increment(1);
            GatewayError::Session(e)
        })
    }

    /// Verify a bearer session token and return its claims.
    pub fn authenticate(&self, token: &str) -> GatewayResult<SessionClaims> {
        self.codec.verify(token, Utc::now()).map_err(|e| {
            metrics::counter!("gemward_auth_failures_total", "strategy" => "local").increment(1);
            GatewayError::Session(e)
        })
    }

    pub async fn bootstrap_admin(&self, supplied_password: Option<&str>) -> GatewayResult<BootstrapOutcome> {
        let existing = self
            .accounts
            .get(ADMIN_USERNAME)
            .await?
            .filter(|a| a.password_hash.is_some());

        let supplied = supplied_password.filter(|p| !p.is_empty());

        let (password, outcome) = match (existing, supplied) {
            (Some(_), None) => return Ok(BootstrapOutcome::Unchanged),
            (Some(admin), Some(pw)) => {
                let hash = admin.password_hash.unwrap_or_default();
                if self.hasher.verify_blocking(pw.to_string(), hash).await {
                    return Ok(BootstrapOutcome::Unchanged);
                }
                tracing::info!("Updating admin password to the externally supplied value");
                (pw.to_string(), BootstrapOutcome::Rotated)
            }
            (None, Some(pw)) => (pw.to_string(), BootstrapOutcome::Created),
            (None, None) => {
                let generated = generate_password(GENERATED_PASSWORD_LEN, GENERATED_PASSWORD_DIGITS);
                tracing::warn!("Generating admin password because GEMWARD_ADMIN_PASSWORD is not set");
                tracing::info!(password = %generated, "Generated admin password");
                (generated, BootstrapOutcome::Generated)
            }
        };

        let hash = self.hasher.hash_blocking(password).await?;
        let mut admin = self
            .accounts
            .get(ADMIN_USERNAME)
            .await?
            .unwrap_or_else(|| Account::local(ADMIN_USERNAME, ADMIN_ROLE, String::new()));
        admin.password_hash = Some(hash);
        admin.account_type = AccountType::Local;
        self.accounts.put(&admin).await?;
        Ok(outcome)
    }

    /// Create or update every declared user and delete every other local
    /// account except `admin`, all in one batch.
    pub async fn provision(&self, declared: &[String]) -> GatewayResult<ProvisionSummary> {
        let mut users = Vec::new();
        for pair in declared {
            let user = DeclaredUser::parse(pair)?;
            if user.username == ADMIN_USERNAME {
                tracing::warn!("Ignoring declared local user 'admin'; use GEMWARD_ADMIN_PASSWORD instead");
                continue;
            }
            users.push(user);
        }

        let existing = self.accounts.list().await?;
        let declared_names: BTreeSet<&str> = users.iter().map(|u| u.username.as_str()).collect();

        let mut batch = AccountBatch::new();
        let mut summary = ProvisionSummary::default();

        for user in &users {
            let hash = self.hasher.hash_blocking(user.password.clone()).await?;
            let account = match existing.iter().find(|a| a.username == user.username) {
                Some(current) => Account {
                    password_hash: Some(hash),
                    account_type: AccountType::Local,
                    ..current.clone()
                },
                None => Account::local(&user.username, &self.provisioned_role, hash),
            };
            tracing::debug!(username = %user.username, "Added or updated local user");
            summary.upserted.push(user.username.clone());
            batch.put(account);
        }

        for account in &existing {
            if account.account_type == AccountType::Local
                && account.username != ADMIN_USERNAME
                && !declared_names.contains(account.username.as_str())
            {
                tracing::debug!(username = %account.username, "Removed local user");
                summary.removed.push(account.username.clone());
                batch.delete(account.username.clone());
            }
        }

        self.accounts.apply(batch).await?;
        tracing::info!(
            upserted = summary.upserted.len(),
            removed = summary.removed.len(),
            "Local users reconciled"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionError;
    use crate::infrastructure::repositories::InMemoryAccountRepository;
    use crate::infrastructure::session_codec::JwtSessionCodec;

    const TEST_COST: u32 = 4;

    fn setup() -> (LocalPasswordAuth, Arc<InMemoryAccountRepository>) {
        let repo = Arc::new(InMemoryAccountRepository::new());
        let codec = Arc::new(JwtSessionCodec::new("secret", &[], 3600, 7200).unwrap());
        let auth = LocalPasswordAuth::new(repo.clone(), codec, BcryptHasher::new(TEST_COST), "read");
        (auth, repo)
    }

    async fn seed(repo: &InMemoryAccountRepository, username: &str, password: &str, role: &str) {
        let hash = BcryptHasher::new(TEST_COST).hash(password).unwrap();
        repo.put(&Account::local(username, role, hash)).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let (auth, repo) = setup();
        seed(&repo, "alice", "pw1", "write").await;

        let session = auth.login("alice", "pw1").await.unwrap();
        let claims = auth.authenticate(&session.token).unwrap();
        assert_eq!(claims.identity, "alice");
        assert_eq!(claims.role, "write");
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (auth, repo) = setup();
        seed(&repo, "alice", "pw1", "write").await;
        repo.put(&Account::github("octocat", "read", "gho".into())).await.unwrap();

        for (user, pw) in [("alice", "wrong"), ("nobody", "pw1"), ("octocat", "")] {
            let err = auth.login(user, pw).await.unwrap_err();
            assert!(matches!(err, GatewayError::AuthenticationFailed), "{user}");
        }
    }

    #[tokio::test]
    async fn test_login_without_stored_hash_still_runs_bcrypt() {
        let (auth, repo) = setup();
        repo.put(&Account::github("octocat", "read", "gho".into())).await.unwrap();
        assert!(auth.absent_hash.get().is_none());

        let err = auth.login("nobody", "pw").await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed));
        let stand_in = auth.absent_hash.get().cloned().unwrap();
        assert!(stand_in.starts_with(&format!("$2b${TEST_COST:02}$")));

        let err = auth.login("octocat", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed));
        assert_eq!(auth.absent_hash.get(), Some(&stand_in));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage() {
        let (auth, _) = setup();
        assert!(matches!(
            auth.authenticate("garbage"),
            Err(GatewayError::Session(SessionError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_refresh_preserves_identity() {
        let (auth, repo) = setup();
        seed(&repo, "alice", "pw1", "write").await;
        let session = auth.login("alice", "pw1").await.unwrap();
        let refreshed = auth.refresh(&session.token).unwrap();
        let claims = auth.authenticate(&refreshed.token).unwrap();
        assert_eq!(claims.identity, "alice");
        assert_eq!(claims.role, "write");
    }

    #[tokio::test]
    async fn test_bootstrap_generates_then_is_stable() {
        let (auth, repo) = setup();
        assert_eq!(auth.bootstrap_admin(None).await.unwrap(), BootstrapOutcome::Generated);
        let first_hash = repo.get("admin").await.unwrap().unwrap().password_hash;

        assert_eq!(auth.bootstrap_admin(None).await.unwrap(), BootstrapOutcome::Unchanged);
        let second_hash = repo.get("admin").await.unwrap().unwrap().password_hash;
        assert_eq!(first_hash, second_hash);
    }

    #[tokio::test]
    async fn test_bootstrap_rotates_supplied_password() {
        let (auth, repo) = setup();
        assert_eq!(auth.bootstrap_admin(Some("first")).await.unwrap(), BootstrapOutcome::Created);
        assert!(auth.login("admin", "first").await.is_ok());

        assert_eq!(auth.bootstrap_admin(Some("first")).await.unwrap(), BootstrapOutcome::Unchanged);
        assert_eq!(auth.bootstrap_admin(Some("second")).await.unwrap(), BootstrapOutcome::Rotated);
        assert!(auth.login("admin", "first").await.is_err());
        assert!(auth.login("admin", "second").await.is_ok());

        let admin = repo.get("admin").await.unwrap().unwrap();
        assert_eq!(admin.role, ADMIN_ROLE);
    }

    #[tokio::test]
    async fn test_provision_reconciles() {
        let (auth, repo) = setup();
        auth.bootstrap_admin(Some("adminpw")).await.unwrap();
        seed(&repo, "alice", "old", "write").await;
        seed(&repo, "carol", "pw", "read").await;
        repo.put(&Account::github("octocat", "read", "gho".into())).await.unwrap();

        let declared = vec!["alice:pw1".to_string(), "bob:pw2".to_string()];
        let summary = auth.provision(&declared).await.unwrap();
        assert_eq!(summary.removed, vec!["carol"]);

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|a| a.username).collect();
        assert_eq!(names, vec!["admin", "alice", "bob", "octocat"]);

        assert!(auth.login("alice", "pw1").await.is_ok());
        assert!(auth.login("alice", "old").await.is_err());
        assert!(auth.login("bob", "pw2").await.is_ok());
        assert_eq!(repo.get("alice").await.unwrap().unwrap().role, "write");
        assert_eq!(repo.get("bob").await.unwrap().unwrap().role, "read");
        assert!(auth.login("admin", "adminpw").await.is_ok());
    }

    #[tokio::test]
    async fn test_provision_ignores_declared_admin() {
        let (auth, repo) = setup();
        auth.bootstrap_admin(Some("adminpw")).await.unwrap();
        auth.provision(&["admin:hijack".to_string()]).await.unwrap();
        assert!(auth.login("admin", "adminpw").await.is_ok());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_declared_user_parsing() {
        let user = DeclaredUser::parse("alice:pa:ss").unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.password, "pa:ss");
        assert!(DeclaredUser::parse("alice").is_err());
        assert!(DeclaredUser::parse(":pw").is_err());
        assert!(DeclaredUser::parse("alice:").is_err());
    }
}
