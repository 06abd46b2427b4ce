// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP API
//!
//! ```text
//! GET    /up                                     health
//! POST   /admin/api/v1/login                     local: {token, expire}; github: {login_url}
//! GET    /admin/api/v1/refresh-token             local: {token, expire}
//! GET    /github/callback?code=…                 github: {token, expire}
//! GET    /admin/api/v1/auth                      active strategy and caller   (session gate)
//! POST   /admin/api/v1/token                     issue a data-plane token     (session gate)
//! GET    /admin/api/v1/users                     list accounts                (session gate)
//! GET    /admin/api/v1/users/{username}                                       (session gate)
//! DELETE /admin/api/v1/users/{username}                                       (session gate)
//! PUT    /admin/api/v1/users/{username}/role/{role}                           (session gate)
//! ANY    {private_gems_path}/{*path}             204 once every gate passes   (data-plane + admission)
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Extension, Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::application::accounts::AccountAdministration;
use crate::application::admission::VulnerabilityAdmissionEngine;
use crate::application::authorization::AuthorizationGate;
use crate::application::data_plane_tokens::DataPlaneTokenStore;
use crate::application::github_auth::GitHubOAuthBridge;
use crate::application::local_auth::LocalPasswordAuth;
use crate::domain::account::AccountSummary;
use crate::domain::config::AuthType;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::presentation::middleware::{admission_gate, bearer_token, data_plane_gate, session_gate, Caller};

/// The one authentication strategy wired at startup.
#[derive(Clone)]
pub enum AuthStrategy {
    None,
    Local(Arc<LocalPasswordAuth>),
    GitHub(Arc<GitHubOAuthBridge>),
}

impl AuthStrategy {
    pub fn kind(&self) -> AuthType {
        match self {
            Self::None => AuthType::None,
            Self::Local(_) => AuthType::Local,
            Self::GitHub(_) => AuthType::Github,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub strategy: AuthStrategy,
    pub authorization: AuthorizationGate,
    pub tokens: Arc<DataPlaneTokenStore>,
    pub admission: Arc<VulnerabilityAdmissionEngine>,
    pub accounts: Arc<AccountAdministration>,
    pub allow_anonymous_read: bool,
    /// Prefix of the forward-auth gem routes, without a trailing slash
    pub private_gems_path: String,
}

pub fn app(state: AppState, request_timeout: Duration) -> Router {
    let admin = Router::new()
        .route("/admin/api/v1/auth", get(whoami))
        .route("/admin/api/v1/token", post(issue_token))
        .route("/admin/api/v1/users", get(list_users))
        .route("/admin/api/v1/users/{username}", get(get_user).delete(delete_user))
        .route("/admin/api/v1/users/{username}/role/{role}", put(set_role))
        .route_layer(from_fn_with_state(state.clone(), session_gate));

    let private_path = format!("{}/{{*path}}", state.private_gems_path);
    let private = Router::new()
        .route(&private_path, any(forward_auth_ok))
        .route_layer(from_fn_with_state(state.clone(), admission_gate))
        .route_layer(from_fn_with_state(state.clone(), data_plane_gate));

    Router::new()
        .route("/up", get(health))
        .route("/admin/api/v1/login", post(login))
        .route("/admin/api/v1/refresh-token", get(refresh))
        .route("/github/callback", get(github_callback))
        .merge(admin)
        .merge(private)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Public endpoints
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login body as JSON or `application/x-www-form-urlencoded`.
pub struct LoginCredentials(pub LoginRequest);

impl<S: Send + Sync> FromRequest<S> for LoginCredentials {
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let parsed = if is_form {
            Form::<LoginRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?
        } else {
            Json::<LoginRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?
        };
        Ok(Self(parsed))
    }
}

async fn login(
    State(state): State<AppState>,
    credentials: Result<LoginCredentials, GatewayError>,
) -> GatewayResult<Response> {
    match &state.strategy {
        AuthStrategy::Local(local) => {
            let LoginCredentials(body) = credentials?;
            let session = local.login(&body.username, &body.password).await?;
            Ok(Json(session).into_response())
        }
        AuthStrategy::GitHub(github) => Ok(Json(json!({ "login_url": github.login_url() })).into_response()),
        AuthStrategy::None => Err(strategy_mismatch(AuthType::None)),
    }
}

async fn refresh(State(state): State<AppState>, request: Request) -> GatewayResult<Response> {
    let AuthStrategy::Local(local) = &state.strategy else {
        return Err(strategy_mismatch(state.strategy.kind()));
    };
    let token = bearer_token(request.headers())?;
    Ok(Json(local.refresh(token)?).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

async fn github_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> GatewayResult<Response> {
    let AuthStrategy::GitHub(github) = &state.strategy else {
        return Err(strategy_mismatch(state.strategy.kind()));
    };
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing code parameter".to_string()))?;
    Ok(Json(github.callback(&code).await?).into_response())
}

fn strategy_mismatch(active: AuthType) -> GatewayError {
    GatewayError::BadRequest(format!("not available with auth type {active}"))
}

// ============================================================================
// Admin endpoints
// ============================================================================

async fn whoami(State(state): State<AppState>, caller: Option<Extension<Caller>>) -> impl IntoResponse {
    let caller = caller.map(|Extension(c)| json!({ "username": c.username, "role": c.role }));
    Json(json!({
        "type": state.strategy.kind(),
        "caller": caller,
    }))
}

async fn issue_token(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
) -> GatewayResult<Response> {
    let Some(Extension(caller)) = caller else {
        return Err(strategy_mismatch(state.strategy.kind()));
    };
    let token = state.tokens.issue_token(&caller.username).await?;
    Ok((StatusCode::CREATED, Json(json!({ "token": token }))).into_response())
}

async fn list_users(State(state): State<AppState>) -> GatewayResult<Json<Vec<AccountSummary>>> {
    Ok(Json(state.accounts.list().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> GatewayResult<Json<AccountSummary>> {
    Ok(Json(state.accounts.get(&username).await?))
}

async fn delete_user(State(state): State<AppState>, Path(username): Path<String>) -> GatewayResult<StatusCode> {
    state.accounts.delete(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role(
    State(state): State<AppState>,
    Path((username, role)): Path<(String, String)>,
) -> GatewayResult<Json<AccountSummary>> {
    Ok(Json(state.accounts.set_role(&username, &role).await?))
}

// ============================================================================
// Private gem routes
// ============================================================================

async fn forward_auth_ok() -> StatusCode {
    StatusCode::NO_CONTENT
}
