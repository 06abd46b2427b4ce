// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the gemward CLI

pub mod config;

pub use self::config::ConfigCommand;
