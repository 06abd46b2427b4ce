// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Oracle
//!
//! Opaque `(role, resource, action) -> allow` decision used by
//! [`crate::application::authorization::AuthorizationGate`]. The concrete
//! evaluator is constructed at composition time and injected; nothing in the
//! request path knows how the decision is made.

use thiserror::Error;

pub trait PolicyOracle: Send + Sync {
    /// Decide whether `role` may perform `action` (an HTTP method) on
    /// `resource` (a request path).
    fn enforce(&self, role: &str, resource: &str, action: &str) -> Result<bool, PolicyError>;

    /// True when `role` is a subject the policy defines.
    fn knows_subject(&self, role: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy source {path}: {reason}")]
    Source { path: String, reason: String },

    #[error("invalid policy model: {0}")]
    Model(String),

    #[error("invalid policy rule at line {line}: {reason}")]
    Rule { line: usize, reason: String },

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}
