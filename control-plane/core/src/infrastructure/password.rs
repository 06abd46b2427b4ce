// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! bcrypt password hashing and random secret generation.

use rand::distr::{Alphanumeric, SampleString};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::error::{GatewayError, GatewayResult};

const DIGITS: &[u8] = b"0123456789";

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Cost floors are enforced by config validation, not here, so tests can
    /// run with a cheap cost.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> GatewayResult<String> {
        bcrypt::hash(password, self.cost).map_err(|e| GatewayError::Internal(format!("bcrypt: {e}")))
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    /// Hash on the blocking pool; bcrypt at production cost takes around a second.
    pub async fn hash_blocking(&self, password: String) -> GatewayResult<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?
    }

    pub async fn verify_blocking(&self, password: String, hash: String) -> bool {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }
}

/// Random alphanumeric password of `len` characters containing at least
/// `min_digits` digits.
pub fn generate_password(len: usize, min_digits: usize) -> String {
    let mut rng = rand::rng();
    let min_digits = min_digits.min(len);
    let mut chars: Vec<char> = (0..min_digits)
        .map(|_| DIGITS[rng.random_range(0..DIGITS.len())] as char)
        .collect();
    chars.extend(Alphanumeric.sample_string(&mut rng, len - min_digits).chars());
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

/// Random alphanumeric token of `len` characters.
pub fn generate_token(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::rng(), len)
}
