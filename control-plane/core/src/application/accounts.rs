// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! Account administration behind the admin API.

use std::sync::Arc;

use crate::application::authorization::AuthorizationGate;
use crate::domain::account::{AccountSummary, ADMIN_USERNAME};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::repository::{AccountRepository, AccountUpdate};

pub struct AccountAdministration {
    accounts: Arc<dyn AccountRepository>,
    authorization: AuthorizationGate,
}

impl AccountAdministration {
    pub fn new(accounts: Arc<dyn AccountRepository>, authorization: AuthorizationGate) -> Self {
        Self { accounts, authorization }
    }

    pub async fn list(&self) -> GatewayResult<Vec<AccountSummary>> {
        let accounts = self.accounts.list().await?;
        Ok(accounts.iter().map(AccountSummary::from).collect())
    }

    pub async fn get(&self, username: &str) -> GatewayResult<AccountSummary> {
        self.accounts
            .get(username)
            .await?
            .map(|a| AccountSummary::from(&a))
            .ok_or_else(|| GatewayError::NotFound(format!("account {username}")))
    }

    /// The bootstrap admin cannot be deleted; it would be recreated on the
    /// next start anyway.
    pub async fn delete(&self, username: &str) -> GatewayResult<()> {
        if username == ADMIN_USERNAME {
            return Err(GatewayError::BadRequest("the admin account cannot be deleted".to_string()));
        }
        self.get(username).await?;
        self.accounts.delete(username).await?;
        tracing::info!(username, "Deleted account");
        Ok(())
    }

    pub async fn set_role(&self, username: &str, role: &str) -> GatewayResult<AccountSummary> {
        if !self.authorization.knows_role(role) {
            return Err(GatewayError::BadRequest(format!("unknown role {role}")));
        }
        if username == ADMIN_USERNAME {
            return Err(GatewayError::BadRequest("the admin account's role is fixed".to_string()));
        }

        let account = self
            .accounts
            .update(username, AccountUpdate::Role(role.to_string()))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("account {username}")))?;
        tracing::info!(username, role, "Changed account role");
        Ok(AccountSummary::from(&account))
    }
}
