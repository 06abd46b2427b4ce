// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Account Aggregate
//!
//! A persisted registry account. Keyed by `username`; created on first
//! GitHub login, by admin bootstrap, or by bulk provisioning. Accounts are
//! mutated on role change, password change and token rotation, and are only
//! removed by an explicit admin action or by provisioning reconciliation.
//!
//! ## Invariants
//!
//! - `username` is non-empty and unique.
//! - `role` always names a subject known to the policy oracle (checked on
//!   role change by [`crate::application::accounts::AccountAdministration`]).
//! - `password_hash` is only ever set on `Local` accounts.
//! - `data_plane_token_digest` holds the SHA-256 of the one active
//!   data-plane token; the raw token is never persisted.

use serde::{Deserialize, Serialize};

/// Username of the bootstrap administrator.
pub const ADMIN_USERNAME: &str = "admin";

/// Role assigned to the bootstrap administrator.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Local,
    Github,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Github => write!(f, "github"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,

    pub role: String,

    #[serde(rename = "type")]
    pub account_type: AccountType,

    /// bcrypt hash (local accounts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Most recent GitHub access token seen for this login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Hex SHA-256 of the active data-plane token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane_token_digest: Option<String>,
}

impl Account {
    /// A local account with a pre-computed password hash.
    pub fn local(username: impl Into<String>, role: impl Into<String>, password_hash: String) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
            account_type: AccountType::Local,
            password_hash: Some(password_hash),
            github_token: None,
            data_plane_token_digest: None,
        }
    }

    /// A GitHub-backed account, created on first successful OAuth login.
    pub fn github(username: impl Into<String>, role: impl Into<String>, access_token: String) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
            account_type: AccountType::Github,
            password_hash: None,
            github_token: Some(access_token),
            data_plane_token_digest: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.username == ADMIN_USERNAME
    }
}

/// Public projection of an account for admin listings. Secrets are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub username: String,
    pub role: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub has_data_plane_token: bool,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            role: account.role.clone(),
            account_type: account.account_type,
            has_data_plane_token: account.data_plane_token_digest.is_some(),
        }
    }
}
