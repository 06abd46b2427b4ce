// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod account;
pub mod advisory;
pub mod config;
pub mod error;
pub mod gem_version;
pub mod identity;
pub mod policy;
pub mod repository;
pub mod session;
