// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Gate
//!
//! Delegates `(role, path, method)` to the injected [`PolicyOracle`] and
//! fails closed: an evaluator error is logged and treated as a deny.

use std::sync::Arc;

use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::policy::PolicyOracle;

#[derive(Clone)]
pub struct AuthorizationGate {
    oracle: Arc<dyn PolicyOracle>,
}

impl AuthorizationGate {
    pub fn new(oracle: Arc<dyn PolicyOracle>) -> Self {
        Self { oracle }
    }

    /// `Ok(())` when the policy allows the request, `Forbidden` otherwise.
    pub fn enforce(&self, role: &str, path: &str, method: &str) -> GatewayResult<()> {
        match self.oracle.enforce(role, path, method) {
            Ok(true) => Ok(()),
            Ok(false) => {
                metrics::counter!("gemward_authz_denied_total").increment(1);
                tracing::warn!(role, path, method, "Denied access to resource by policy");
                Err(GatewayError::Forbidden("denied access to resource by policy".to_string()))
            }
            Err(e) => {
                metrics::counter!("gemward_authz_denied_total").increment(1);
                tracing::error!(error = %e, role, path, method, "Policy evaluation failed");
                Err(GatewayError::Forbidden("failed to evaluate access policy".to_string()))
            }
        }
    }

    pub fn knows_role(&self, role: &str) -> bool {
        self.oracle.knows_subject(role)
    }
}
