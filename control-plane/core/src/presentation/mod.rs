// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! Axum surface over the application services. No decisions are made here;
//! the gates in [`middleware`] call into `crate::application` and
//! [`error`] turns the result into a status code.

pub mod api;
pub mod error;
pub mod middleware;
