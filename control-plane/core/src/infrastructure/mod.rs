// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod session_codec;
pub mod password;
pub mod github_client;
pub mod token_cache;
pub mod policy_files;
pub mod advisory_db;

pub use advisory_db::{AdvisoryCache, GitAdvisoryDatabase};
pub use github_client::GitHubClient;
pub use password::BcryptHasher;
pub use policy_files::FilePolicyOracle;
pub use session_codec::JwtSessionCodec;
pub use token_cache::GitHubTokenCache;
