// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Error Taxonomy
//!
//! | Variant | When | Client sees |
//! |---------|------|-------------|
//! | `Configuration` | startup only: missing policy files, bad auth type | process exits |
//! | `AuthenticationFailed` | bad credential, bad/expired session | 401 |
//! | `BadCredentialHeader` | missing or garbled `Authorization` | 400 |
//! | `InvalidToken` | identity provider rejected the access token | 401 |
//! | `Upstream` | identity provider unreachable / non-2xx exchange | 502 |
//! | `Forbidden` | policy said no, evaluator failed, org gate failed | 403 |
//! | `AdvisorySync` | clone/pull failed | logged only |
//! | `AdvisoryParse` | malformed advisory record | logged only |
//! | `VersionParse` | unparsable version under `block` policy | 403 |
//! | `NotFound` / `BadRequest` | admin API lookups and role changes | 404 / 400 |
//!
//! Messages carried by the variants are short and safe to echo; internal
//! detail belongs in the log, never in the response body.

use thiserror::Error;

use crate::domain::repository::RepositoryError;
use crate::domain::session::SessionError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("{0}")]
    BadCredentialHeader(&'static str),

    #[error("session rejected: {0}")]
    Session(#[from] SessionError),

    #[error("invalid access token: {0}")]
    InvalidToken(String),

    #[error("identity provider error: {0}")]
    Upstream(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("advisory sync failed: {0}")]
    AdvisorySync(String),

    #[error("malformed advisory {path}: {reason}")]
    AdvisoryParse { path: String, reason: String },

    #[error("unparsable version {version} for {gem}")]
    VersionParse { gem: String, version: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
