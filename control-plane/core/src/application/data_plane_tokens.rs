// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Data-Plane Tokens
//!
//! Long-lived credentials for `gem push`, `gem yank` and bundler downloads.
//! One active token per account, no expiry. Reissuing replaces the stored
//! digest, which revokes the previous token.
//!
//! Only the SHA-256 digest of the raw token is persisted. Callers receive
//! the raw token base64-encoded and present it back in that form.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::account::Account;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::repository::{AccountRepository, AccountUpdate};
use crate::infrastructure::password::generate_token;

pub const DATA_PLANE_TOKEN_LEN: usize = 32;

pub struct DataPlaneTokenStore {
    accounts: Arc<dyn AccountRepository>,
}

impl DataPlaneTokenStore {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Generate a fresh token for `username`, replacing any previous one.
    pub async fn issue_token(&self, username: &str) -> GatewayResult<String> {
        let raw = generate_token(DATA_PLANE_TOKEN_LEN);
        self.accounts
            .update(username, AccountUpdate::DataPlaneTokenDigest(token_digest(&raw)))
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("account {username}")))?;

        tracing::info!(username, "Issued data-plane token");
        Ok(BASE64.encode(raw))
    }

    /// Resolve an encoded token to its account.
    pub async fn validate(&self, encoded: &str) -> GatewayResult<Account> {
        let not_found = || GatewayError::NotFound("data-plane token".to_string());

        let raw = BASE64
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(not_found)?;
        let digest = token_digest(&raw);

        let account = self
            .accounts
            .find_by_data_plane_token(&digest)
            .await?
            .ok_or_else(not_found)?;

        let matches = account
            .data_plane_token_digest
            .as_deref()
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(digest.as_bytes())));
        if matches {
            Ok(account)
        } else {
            Err(not_found())
        }
    }
}

pub fn token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Pull the token out of an `Authorization` header value.
///
/// Accepted forms: `<token>`, `Bearer <token>`, and `Basic <b64(user:pass)>`
/// where either half carries the token (the password wins when both are set).
pub fn extract_credential(header: &str) -> GatewayResult<String> {
    let header = header.trim();
    if header.is_empty() {
        return Err(GatewayError::BadCredentialHeader("empty authorization header"));
    }

    if let Some(token) = strip_scheme(header, "Bearer") {
        return non_empty(token);
    }

    if let Some(encoded) = strip_scheme(header, "Basic") {
        let decoded = BASE64
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(GatewayError::BadCredentialHeader("malformed basic credentials"))?;
        let (user, pass) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
        return match (user.trim(), pass.trim()) {
            (_, pass) if !pass.is_empty() => Ok(pass.to_string()),
            (user, _) if !user.is_empty() => Ok(user.to_string()),
            _ => Err(GatewayError::BadCredentialHeader("empty basic credentials")),
        };
    }

    Ok(header.to_string())
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    if header.eq_ignore_ascii_case(scheme) {
        return Some("");
    }
    let (prefix, rest) = header.split_once(' ')?;
    prefix.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

fn non_empty(token: &str) -> GatewayResult<String> {
    if token.is_empty() {
        Err(GatewayError::BadCredentialHeader("empty bearer token"))
    } else {
        Ok(token.to_string())
    }
}
