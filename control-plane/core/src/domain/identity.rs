// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! External identity provider capability (GitHub OAuth).

use async_trait::async_trait;

use crate::domain::error::GatewayResult;

/// Read-only view of an OAuth identity provider.
///
/// Errors follow the gateway taxonomy: transport failures and non-2xx token
/// exchanges are `GatewayError::Upstream`; a token the provider rejects, or a
/// profile without a login, is `GatewayError::InvalidToken`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> GatewayResult<String>;

    /// Login name of the token's owner.
    async fn fetch_login(&self, access_token: &str) -> GatewayResult<String>;

    /// Logins of every organization the token's owner belongs to.
    async fn fetch_org_logins(&self, access_token: &str) -> GatewayResult<Vec<String>>;

    /// Browser redirect that starts the OAuth flow.
    fn authorize_url(&self) -> String;
}
