// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Session Claims
//!
//! Identity carried inside a signed session token. Claims are never stored
//! server-side: every request reconstructs them from the bearer token via a
//! [`SessionCodec`], and the only revocation is expiry.
//!
//! ## Lifecycle
//!
//! ```text
//!   issue ──► Valid ──(now ≥ exp)──► Expired ──(now ≥ orig_iat + max_refresh)──► Dead
//!               │                       │
//!               └──────── refresh ◄─────┘   (new exp, same orig_iat)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed claims extracted from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub identity: String,
    pub role: String,
    /// GitHub access token, present only for the GitHub strategy
    pub github_token: Option<String>,
    /// When the original login happened; refresh keeps this fixed
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn new(identity: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            role: role.into(),
            github_token: None,
            issued_at: now,
            expires_at: now,
        }
    }

    pub fn with_github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }
}

/// Wire format of the signed token body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireClaims {
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    pub exp: i64,
    pub orig_iat: i64,
}

/// Issued token plus its expiry, returned to the client as `{token, expire}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expire: DateTime<Utc>,
}

/// Issues and verifies session tokens.
///
/// `now` is always injected so that expiry and refresh boundaries are
/// testable to the second.
pub trait SessionCodec: Send + Sync {
    /// Sign `claims` with a fresh expiry. `claims.issued_at` becomes `orig_iat`.
    fn issue(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<IssuedSession, SessionError>;

    /// Verify signature and expiry.
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError>;

    /// Re-issue a token whose signature holds and whose refresh window is
    /// still open. Identity, role and `orig_iat` are preserved.
    fn refresh(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedSession, SessionError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("refresh window elapsed")]
    RefreshWindowElapsed,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}
