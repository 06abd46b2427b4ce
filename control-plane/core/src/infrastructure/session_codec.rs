// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::domain::session::{IssuedSession, SessionClaims, SessionCodec, SessionError, WireClaims};

/// HS256 session tokens.
///
/// The validation is pinned to HS256: a token whose header names any other
/// algorithm, `none` included, fails before its claims are read. Expiry is
/// checked here against the caller's `now` instead of the library's clock.
pub struct JwtSessionCodec {
    encoding_key: EncodingKey,
    decoding_keys: Vec<DecodingKey>,
    timeout: Duration,
    max_refresh: Duration,
}

impl JwtSessionCodec {
    pub fn new(
        secret: &str,
        previous_secrets: &[String],
        timeout_secs: u64,
        max_refresh_secs: u64,
    ) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::Encoding("session secret must not be empty".to_string()));
        }
        let decoding_keys = std::iter::once(secret)
            .chain(previous_secrets.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .map(|s| DecodingKey::from_secret(s.as_bytes()))
            .collect();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_keys,
            timeout: seconds(timeout_secs),
            max_refresh: seconds(max_refresh_secs),
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation
    }

    /// Signature check only: tries the current key, then each retired key.
    fn decode_signed(&self, token: &str) -> Result<WireClaims, SessionError> {
        let validation = Self::validation();
        let mut last = SessionError::InvalidSignature;
        for key in &self.decoding_keys {
            match decode::<WireClaims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => last = SessionError::InvalidSignature,
                    ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                        return Err(SessionError::InvalidSignature)
                    }
                    _ => return Err(SessionError::Malformed(e.to_string())),
                },
            }
        }
        Err(last)
    }

    fn sign(&self, wire: &WireClaims) -> Result<String, SessionError> {
        encode(&Header::new(Algorithm::HS256), wire, &self.encoding_key)
            .map_err(|e| SessionError::Encoding(e.to_string()))
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

fn from_timestamp(ts: i64) -> Result<DateTime<Utc>, SessionError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| SessionError::Malformed(format!("timestamp {ts} out of range")))
}

impl SessionCodec for JwtSessionCodec {
    fn issue(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<IssuedSession, SessionError> {
        let expire = now + self.timeout;
        let wire = WireClaims {
            id: claims.identity.clone(),
            role: claims.role.clone(),
            github_token: claims.github_token.clone(),
            exp: expire.timestamp(),
            orig_iat: now.timestamp(),
        };
        Ok(IssuedSession {
            token: self.sign(&wire)?,
            expire,
        })
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let wire = self.decode_signed(token)?;
        if now.timestamp() >= wire.exp {
            return Err(SessionError::Expired);
        }
        if wire.id.is_empty() {
            return Err(SessionError::Malformed("empty identity".to_string()));
        }
        Ok(SessionClaims {
            identity: wire.id,
            role: wire.role,
            github_token: wire.github_token,
            issued_at: from_timestamp(wire.orig_iat)?,
            expires_at: from_timestamp(wire.exp)?,
        })
    }

    fn refresh(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedSession, SessionError> {
        let wire = self.decode_signed(token)?;
        let orig_iat = from_timestamp(wire.orig_iat)?;
        if now >= orig_iat + self.max_refresh {
            return Err(SessionError::RefreshWindowElapsed);
        }
        let expire = now + self.timeout;
        let refreshed = WireClaims {
            exp: expire.timestamp(),
            ..wire
        };
        Ok(IssuedSession {
            token: self.sign(&refreshed)?,
            expire,
        })
    }
}
