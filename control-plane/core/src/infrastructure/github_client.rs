// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! GitHub REST Client
//!
//! Implements [`IdentityProvider`] against GitHub's OAuth and REST APIs.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Code exchange, login lookup and organization lookup
//! - **Integration:** `github.com/login/oauth` → `api.github.com/user{,/orgs}`
//!
//! Both base URLs are configurable so tests can point the client at a local
//! mock server. Every request carries the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::config::GitHubConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::identity::IdentityProvider;

const OAUTH_SCOPES: &str = "read:user,read:org";
const USER_AGENT: &str = concat!("gemward/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Wire Models
// ============================================================================

#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

/// GitHub answers 200 even for a bad code; failures come back as `error`.
#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    #[serde(default)]
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubOrg {
    login: String,
}

// ============================================================================
// Client Implementation
// ============================================================================

pub struct GitHubClient {
    client: Client,
    api_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            oauth_url: config.oauth_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    async fn get_authenticated(&self, path: &str, access_token: &str) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("GET {path}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(GatewayError::InvalidToken(format!("GET {path} returned {status}")))
        }
    }
}

#[async_trait]
impl IdentityProvider for GitHubClient {
    async fn exchange_code(&self, code: &str) -> GatewayResult<String> {
        let url = format!("{}/login/oauth/access_token", self.oauth_url);
        let body = TokenExchangeRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
        };
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("token exchange request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "token exchange returned {}",
                response.status()
            )));
        }

        let parsed: TokenExchangeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("unreadable token exchange response: {e}")))?;

        if let Some(error) = parsed.error {
            tracing::warn!(
                error = %error,
                description = parsed.error_description.as_deref().unwrap_or(""),
                "GitHub rejected the OAuth code"
            );
            return Err(GatewayError::Upstream(format!("token exchange failed: {error}")));
        }

        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Upstream("token exchange returned no access token".to_string()))
    }

    async fn fetch_login(&self, access_token: &str) -> GatewayResult<String> {
        let user: GitHubUser = self
            .get_authenticated("/user", access_token)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("unreadable /user response: {e}")))?;

        user.login
            .filter(|l| !l.is_empty())
            .ok_or_else(|| GatewayError::InvalidToken("user login not returned from GitHub".to_string()))
    }

    async fn fetch_org_logins(&self, access_token: &str) -> GatewayResult<Vec<String>> {
        let orgs: Vec<GitHubOrg> = self
            .get_authenticated("/user/orgs", access_token)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("unreadable /user/orgs response: {e}")))?;

        Ok(orgs.into_iter().map(|o| o.login).collect())
    }

    fn authorize_url(&self) -> String {
        format!(
            "{}/login/oauth/authorize?scope={}&client_id={}",
            self.oauth_url, OAUTH_SCOPES, self.client_id
        )
    }
}
