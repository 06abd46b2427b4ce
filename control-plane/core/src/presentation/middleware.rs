// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Request Gates
//!
//! | Gate | Routes | Steps |
//! |------|--------|-------|
//! | [`session_gate`] | `/admin/api/v1/*` | bearer → session verify (+ GitHub re-check) → policy |
//! | [`data_plane_gate`] | private gem path | credential → token lookup → policy |
//! | [`admission_gate`] | `GET {private}/gems/{file}` | file name → advisory decision |
//!
//! Each gate that establishes a caller stores a [`Caller`] in the request
//! extensions. The data-plane and admission gates match against
//! [`normalize_path`], the path the artifact server will actually resolve.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use percent_encoding::percent_decode_str;

use crate::domain::error::{GatewayError, GatewayResult};
use crate::presentation::api::{AppState, AuthStrategy};

/// Authenticated principal of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub role: String,
}

pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let claims = match &state.strategy {
        AuthStrategy::None => return Ok(next.run(request).await),
        AuthStrategy::Local(local) => local.authenticate(bearer_token(request.headers())?)?,
        AuthStrategy::GitHub(github) => {
            let token = bearer_token(request.headers())?.to_string();
            github.authenticate_session(&token).await?
        }
    };

    state
        .authorization
        .enforce(&claims.role, request.uri().path(), request.method().as_str())?;

    request.extensions_mut().insert(Caller {
        username: claims.identity,
        role: claims.role,
    });
    Ok(next.run(request).await)
}

pub async fn data_plane_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if matches!(state.strategy, AuthStrategy::None) {
        return Ok(next.run(request).await);
    }
    if state.allow_anonymous_read && is_read(request.method()) {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(GatewayError::AuthenticationFailed)?
        .to_str()
        .map_err(|_| GatewayError::BadCredentialHeader("authorization header is not valid text"))?;
    let credential = crate::application::data_plane_tokens::extract_credential(header)?;

    let account = match state.tokens.validate(&credential).await {
        Ok(account) => account,
        Err(GatewayError::NotFound(_)) => {
            metrics::counter!("gemward_auth_failures_total", "strategy" => "data_plane").increment(1);
            return Err(GatewayError::AuthenticationFailed);
        }
        Err(e) => return Err(e),
    };

    let path = normalize_path(request.uri().path())?;
    state
        .authorization
        .enforce(&account.role, &path, request.method().as_str())?;

    request.extensions_mut().insert(Caller {
        username: account.username,
        role: account.role,
    });
    Ok(next.run(request).await)
}

pub async fn admission_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if is_read(request.method()) {
        let path = normalize_path(request.uri().path())?;
        if let Some(file_name) = gem_download(&state.private_gems_path, &path) {
            state.admission.admit_file(file_name)?;
        }
    }
    Ok(next.run(request).await)
}

fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// `{private}/gems/<rest>` → `<rest>`. Nested paths are returned as-is so
/// admission can refuse or admit them under the unparsable-version policy.
fn gem_download<'a>(private_gems_path: &str, path: &'a str) -> Option<&'a str> {
    let file = path.strip_prefix(private_gems_path)?.strip_prefix("/gems/")?;
    (!file.is_empty()).then_some(file)
}

/// Percent-decode `raw` and resolve empty, `.` and `..` segments.
/// Paths that are not UTF-8 once decoded, or that climb above the root,
/// are rejected.
pub fn normalize_path(raw: &str) -> GatewayResult<String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GatewayError::BadRequest("request path is not valid UTF-8".to_string()))?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments
                    .pop()
                    .ok_or_else(|| GatewayError::BadRequest("request path escapes the root".to_string()))?;
            }
            other => segments.push(other),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// The token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> GatewayResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(GatewayError::AuthenticationFailed)?
        .to_str()
        .map_err(|_| GatewayError::BadCredentialHeader("authorization header is not valid text"))?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(GatewayError::BadCredentialHeader("expected a bearer token"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(GatewayError::BadCredentialHeader("expected a bearer token"));
    }
    Ok(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_gem_download_paths() {
        assert_eq!(gem_download("/private", "/private/gems/rack-3.0.0.gem"), Some("rack-3.0.0.gem"));
        assert_eq!(gem_download("/private", "/private/gems/"), None);
        assert_eq!(gem_download("/private", "/private/gems/a/b.gem"), Some("a/b.gem"));
        assert_eq!(gem_download("/private", "/private/specs.4.8.gz"), None);
        assert_eq!(gem_download("/private", "/public/gems/rack-3.0.0.gem"), None);
    }

    #[test]
    fn test_normalize_path_resolves_alternate_spellings() {
        for raw in [
            "/private/gems/rack-2.1.0.gem",
            "/private//gems/rack-2.1.0.gem",
            "/private/./gems/rack-2.1.0.gem",
            "/private/gems/rack-2.1.0%2Egem",
            "/private/gems/rack%2D2.1.0.gem",
            "/private/specs/../gems/rack-2.1.0.gem",
            "/private/gems/%2E/rack-2.1.0.gem",
        ] {
            assert_eq!(normalize_path(raw).unwrap(), "/private/gems/rack-2.1.0.gem", "{raw}");
        }
        assert_eq!(normalize_path("/").unwrap(), "/");
    }

    #[test]
    fn test_normalize_path_rejects_bad_paths() {
        assert!(matches!(normalize_path("/private/gems/%FF.gem"), Err(GatewayError::BadRequest(_))));
        assert!(matches!(normalize_path("/private/../../etc"), Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(GatewayError::AuthenticationFailed)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(matches!(bearer_token(&headers), Err(GatewayError::BadCredentialHeader(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert!(matches!(bearer_token(&headers), Err(GatewayError::BadCredentialHeader(_))));
    }
}
