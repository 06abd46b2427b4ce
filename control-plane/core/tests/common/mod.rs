// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use gemward_core::application::accounts::AccountAdministration;
use gemward_core::application::admission::VulnerabilityAdmissionEngine;
use gemward_core::application::authorization::AuthorizationGate;
use gemward_core::application::data_plane_tokens::DataPlaneTokenStore;
use gemward_core::application::github_auth::GitHubOAuthBridge;
use gemward_core::application::local_auth::LocalPasswordAuth;
use gemward_core::domain::account::Account;
use gemward_core::domain::advisory::{AdvisoryIndex, AdvisoryRecord, AdvisorySource, SeverityThreshold};
use gemward_core::domain::config::{AdvisoryConfig, GitHubConfig};
use gemward_core::domain::error::GatewayResult;
use gemward_core::domain::repository::AccountRepository;
use gemward_core::infrastructure::repositories::InMemoryAccountRepository;
use gemward_core::infrastructure::{
    AdvisoryCache, BcryptHasher, FilePolicyOracle, GitHubClient, GitHubTokenCache, JwtSessionCodec,
};
use gemward_core::presentation::api::{app, AppState, AuthStrategy};

pub const MODEL: &str = "roles:\n  admin: [write]\n  write: [read]\n  read: []\n";
pub const TABLE: &str = r#"
p, read,  /private/*,           GET|HEAD
p, write, /private/api/v1/gems, POST
p, read,  /admin/api/v1/auth,   GET
p, read,  /admin/api/v1/token,  POST
p, admin, /admin/api/v1/*,      *
"#;

const TEST_COST: u32 = 4;

pub enum Strategy {
    None,
    Local,
    GitHub { server_url: String, required_orgs: Vec<String> },
}

pub struct Harness {
    pub app: Router,
    pub repo: Arc<InMemoryAccountRepository>,
    pub tokens: Arc<DataPlaneTokenStore>,
}

struct FixedAdvisories;

impl AdvisorySource for FixedAdvisories {
    fn sync(&self) -> GatewayResult<()> {
        Ok(())
    }

    fn load(&self) -> GatewayResult<AdvisoryIndex> {
        let mut index = AdvisoryIndex::new();
        index.insert(
            "rack".to_string(),
            vec![AdvisoryRecord {
                gem: "rack".to_string(),
                cve: Some("2022-30123".to_string()),
                cvss_v3: Some(10.0),
                patched_versions: vec![">= 2.2.3.1".to_string()],
                ..Default::default()
            }],
        );
        Ok(index)
    }
}

pub async fn harness(strategy: Strategy, allow_anonymous_read: bool) -> Harness {
    let repo = Arc::new(InMemoryAccountRepository::new());
    let hasher = BcryptHasher::new(TEST_COST);
    for (username, role, password) in [("admin", "admin", "adminpw"), ("alice", "write", "pw1"), ("bob", "read", "pw2")] {
        let hash = hasher.hash(password).unwrap();
        repo.put(&Account::local(username, role, hash)).await.unwrap();
    }

    let codec = Arc::new(JwtSessionCodec::new("integration-secret", &[], 3600, 7200).unwrap());
    let oracle = FilePolicyOracle::from_sources(MODEL, TABLE).unwrap();
    let authorization = AuthorizationGate::new(Arc::new(oracle));

    let strategy = match strategy {
        Strategy::None => AuthStrategy::None,
        Strategy::Local => AuthStrategy::Local(Arc::new(LocalPasswordAuth::new(
            repo.clone(),
            codec.clone(),
            hasher,
            "read",
        ))),
        Strategy::GitHub { server_url, required_orgs } => {
            let config = GitHubConfig {
                client_id: "cid".to_string(),
                client_secret: "csecret".to_string(),
                api_url: server_url.clone(),
                oauth_url: server_url,
                required_orgs: required_orgs.clone(),
                ..Default::default()
            };
            AuthStrategy::GitHub(Arc::new(GitHubOAuthBridge::new(
                Arc::new(GitHubClient::new(&config).unwrap()),
                repo.clone(),
                codec.clone(),
                Arc::new(GitHubTokenCache::new(Duration::from_secs(300))),
                &required_orgs,
                "read",
            )))
        }
    };

    let advisory_config = AdvisoryConfig {
        enabled: true,
        max_severity: SeverityThreshold::High,
        ..Default::default()
    };
    let admission = Arc::new(VulnerabilityAdmissionEngine::new(
        Arc::new(FixedAdvisories),
        Arc::new(AdvisoryCache::new()),
        &advisory_config,
    ));
    admission.rebuild().await.unwrap();

    let tokens = Arc::new(DataPlaneTokenStore::new(repo.clone()));
    let state = AppState {
        strategy,
        authorization: authorization.clone(),
        tokens: tokens.clone(),
        admission,
        accounts: Arc::new(AccountAdministration::new(repo.clone(), authorization)),
        allow_anonymous_read,
        private_gems_path: "/private".to_string(),
    };

    Harness {
        app: app(state, Duration::from_secs(30)),
        repo,
        tokens,
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    request("GET", uri, authorization)
}

pub fn request(method: &str, uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Log in through the HTTP API and return the session token.
pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        json_post(
            "/admin/api/v1/login",
            serde_json::json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    parsed["token"].as_str().unwrap().to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
