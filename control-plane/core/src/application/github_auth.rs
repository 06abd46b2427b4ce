// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # GitHub OAuth Bridge
//!
//! Turns a GitHub OAuth code into a gemward session and re-checks the
//! embedded access token on later requests.
//!
//! ```text
//! callback(code) ─► exchange_code ─► authenticate_user ─► issue session
//!                                        │
//!                                        ├─ fetch_login      (InvalidToken)
//!                                        ├─ org gate         (Forbidden)
//!                                        ├─ upsert account
//!                                        └─ cache token
//!
//! authenticate_session(bearer) ─► verify ─► cache hit? ──yes──► claims
//!                                               │no
//!                                               └─► authenticate_user (any failure → Forbidden)
//! ```
//!
//! A cache hit skips both network calls and does not re-check org
//! membership; entries live for the cache TTL (5 minutes by default).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::account::Account;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::identity::IdentityProvider;
use crate::domain::repository::{AccountRepository, AccountUpdate};
use crate::domain::session::{IssuedSession, SessionClaims, SessionCodec};
use crate::infrastructure::token_cache::GitHubTokenCache;

pub struct GitHubOAuthBridge {
    provider: Arc<dyn IdentityProvider>,
    accounts: Arc<dyn AccountRepository>,
    codec: Arc<dyn SessionCodec>,
    cache: Arc<GitHubTokenCache>,
    required_orgs: HashSet<String>,
    default_role: String,
}

impl GitHubOAuthBridge {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        accounts: Arc<dyn AccountRepository>,
        codec: Arc<dyn SessionCodec>,
        cache: Arc<GitHubTokenCache>,
        required_orgs: &[String],
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            accounts,
            codec,
            cache,
            required_orgs: required_orgs.iter().map(|o| o.to_lowercase()).collect(),
            default_role: default_role.into(),
        }
    }

    pub fn login_url(&self) -> String {
        self.provider.authorize_url()
    }

    pub async fn callback(&self, code: &str) -> GatewayResult<IssuedSession> {
        let access_token = self.provider.exchange_code(code).await.inspect_err(|_| {
            metrics::counter!("gemward_auth_failures_total", "strategy" => "github").increment(1);
        })?;
        let account = self.authenticate_user(&access_token).await?;

        let claims = SessionClaims::new(&account.username, &account.role).with_github_token(access_token);
        let session = self.codec.issue(&claims, Utc::now())?;
        tracing::info!(username = %account.username, "GitHub login succeeded");
        Ok(session)
    }

    /// Resolve the token's owner, enforce the org gate, upsert the account
    /// and mark the token as recently verified.
    pub async fn authenticate_user(&self, access_token: &str) -> GatewayResult<Account> {
        let result = self.authenticate_uncached(access_token).await;
        if result.is_err() {
            metrics::counter!("gemward_auth_failures_total", "strategy" => "github").increment(1);
        }
        result
    }

    async fn authenticate_uncached(&self, access_token: &str) -> GatewayResult<Account> {
        let login = self.provider.fetch_login(access_token).await?;
        self.check_org_membership(&login, access_token).await?;

        let account = match self.accounts.get(&login).await? {
            Some(existing) if existing.github_token.as_deref() == Some(access_token) => existing,
            Some(_) => self.store_rotated_token(&login, access_token).await?,
            None => {
                let account = Account::github(&login, &self.default_role, access_token.to_string());
                if self.accounts.create(&account).await? {
                    tracing::info!(username = %login, role = %self.default_role, "Created GitHub account");
                    account
                } else {
                    // Created by a concurrent login since the lookup.
                    self.store_rotated_token(&login, access_token).await?
                }
            }
        };

        self.cache.insert(access_token);
        Ok(account)
    }

    async fn store_rotated_token(&self, login: &str, access_token: &str) -> GatewayResult<Account> {
        tracing::debug!(username = %login, "Updating stored GitHub token");
        self.accounts
            .update(login, AccountUpdate::GitHubToken(access_token.to_string()))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("account {login}")))
    }

    /// Case-insensitive intersection between the caller's orgs and the
    /// required list. An empty required list admits nobody.
    pub async fn check_org_membership(&self, login: &str, access_token: &str) -> GatewayResult<()> {
        let orgs = self.provider.fetch_org_logins(access_token).await?;
        let member = orgs
            .iter()
            .any(|org| self.required_orgs.contains(&org.to_lowercase()));

        if member {
            Ok(())
        } else {
            tracing::warn!(username = %login, "GitHub user is not a member of any required organization");
            Err(GatewayError::Forbidden(format!(
                "user {login} is not a member of a required organization"
            )))
        }
    }

    /// Verify a bearer session and make sure its GitHub token is still good.
    pub async fn authenticate_session(&self, bearer: &str) -> GatewayResult<SessionClaims> {
        let claims = self.codec.verify(bearer, Utc::now())?;

        let Some(access_token) = claims.github_token.as_deref() else {
            return Err(GatewayError::Forbidden("session carries no GitHub token".to_string()));
        };

        if !self.cache.contains(access_token) {
            if let Err(e) = self.authenticate_user(access_token).await {
                tracing::warn!(error = %e, identity = %claims.identity, "GitHub re-authentication failed");
                return Err(GatewayError::Forbidden("GitHub authentication failed".to_string()));
            }
        }
        Ok(claims)
    }
}
