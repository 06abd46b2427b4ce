// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`local_auth`] | password login, refresh, admin bootstrap, bulk provisioning |
//! | [`github_auth`] | OAuth callback, org gate, token re-validation |
//! | [`authorization`] | fail-closed delegation to the policy oracle |
//! | [`data_plane_tokens`] | issue and validate long-lived package tokens |
//! | [`admission`] | advisory sync and per-download vulnerability decisions |
//! | [`accounts`] | admin API account management |

pub mod accounts;
pub mod admission;
pub mod authorization;
pub mod data_plane_tokens;
pub mod github_auth;
pub mod local_auth;
