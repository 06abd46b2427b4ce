// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Short-lived record of GitHub access tokens that recently passed
//! authentication. A hit lets the request skip the `/user` and `/user/orgs`
//! round-trips; it is not a fresh authorization check.
//!
//! Entries are keyed by the SHA-256 digest of the token, so the raw token
//! never sits in process memory longer than the request that carried it.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

pub struct GitHubTokenCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl GitHubTokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, access_token: &str) {
        self.insert_at(access_token, Instant::now());
    }

    pub fn contains(&self, access_token: &str) -> bool {
        self.contains_at(access_token, Instant::now())
    }

    fn insert_at(&self, access_token: &str, now: Instant) {
        self.entries.insert(token_key(access_token), now + self.ttl);
    }

    fn contains_at(&self, access_token: &str, now: Instant) -> bool {
        let key = token_key(access_token);
        let live = self
            .entries
            .get(&key)
            .map(|expires_at| now < *expires_at);
        match live {
            Some(true) => {
                metrics::counter!("gemward_github_token_cache_hits_total").increment(1);
                tracing::debug!("GitHub token cache hit");
                true
            }
            Some(false) => {
                self.entries.remove_if(&key, |_, expires_at| now >= *expires_at);
                false
            }
            None => false,
        }
    }

    /// Drop every expired entry and return how many went. Run on a timer so
    /// the map does not grow without bound on a long-running process.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, expires_at| {
            let live = now < *expires_at;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn token_key(access_token: &str) -> String {
    hex::encode(Sha256::digest(access_token.as_bytes()))
}
