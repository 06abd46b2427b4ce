// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # gemward core
//!
//! Identity and admission control plane for a private gem registry.
//!
//! Every inbound request passes through three decisions:
//!
//! 1. **Authentication**: exactly one strategy (local password, GitHub OAuth,
//!    or none) establishes the caller's identity and role.
//! 2. **Authorization**: the role is checked against a declarative policy via
//!    [`application::authorization::AuthorizationGate`].
//! 3. **Admission**: gem downloads are checked against the advisory database
//!    via [`application::admission::VulnerabilityAdmissionEngine`].
//!
//! # Architecture
//!
//! - **domain**: types and capability traits, no I/O
//! - **application**: the auth strategies, gates and admission engine
//! - **infrastructure**: JWT, bcrypt, GitHub REST, git, sled, policy files
//! - **presentation**: axum router and middleware

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
