// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use common::{bearer, get, harness, json_post, login, request, send, Strategy};
use gemward_core::domain::repository::AccountRepository;

#[tokio::test]
async fn health_is_public() {
    let h = harness(Strategy::Local, false).await;
    let (status, body) = send(&h.app, get("/up", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ok"));
}

#[tokio::test]
async fn local_login_then_admin_listing() {
    let h = harness(Strategy::Local, false).await;
    let token = login(&h.app, "admin", "adminpw").await;

    let (status, body) = send(&h.app, get("/admin/api/v1/users", Some(&bearer(&token)))).await;
    assert_eq!(status, StatusCode::OK);
    let users: serde_json::Value = serde_json::from_str(&body).unwrap();
    let names: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["admin", "alice", "bob"]);
    assert!(!body.contains("password"));
}

#[tokio::test]
async fn login_accepts_form_bodies() {
    let h = harness(Strategy::Local, false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/admin/api/v1/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=bob&password=pw2"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("expire"));
}

#[tokio::test]
async fn bad_credentials_are_uniform_401() {
    let h = harness(Strategy::Local, false).await;
    for (user, pw) in [("admin", "wrong"), ("nobody", "adminpw")] {
        let (status, body) = send(
            &h.app,
            json_post("/admin/api/v1/login", serde_json::json!({ "username": user, "password": pw })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "authentication failed");
    }
}

#[tokio::test]
async fn admin_routes_need_a_valid_session_and_role() {
    let h = harness(Strategy::Local, false).await;

    let (status, _) = send(&h.app, get("/admin/api/v1/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, get("/admin/api/v1/users", Some("Bearer not.a.jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bob = login(&h.app, "bob", "pw2").await;
    let (status, _) = send(&h.app, get("/admin/api/v1/users", Some(&bearer(&bob)))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.app, get("/admin/api/v1/auth", Some(&bearer(&bob)))).await;
    assert_eq!(status, StatusCode::OK);
    let whoami: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(whoami["type"], "local");
    assert_eq!(whoami["caller"]["username"], "bob");
}

#[tokio::test]
async fn refresh_returns_a_new_session() {
    let h = harness(Strategy::Local, false).await;
    let token = login(&h.app, "alice", "pw1").await;
    let (status, body) = send(&h.app, get("/admin/api/v1/refresh-token", Some(&bearer(&token)))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let refreshed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let refreshed = refreshed["token"].as_str().unwrap();

    let (status, _) = send(&h.app, get("/admin/api/v1/auth", Some(&bearer(refreshed)))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn role_changes_are_validated() {
    let h = harness(Strategy::Local, false).await;
    let admin = bearer(&login(&h.app, "admin", "adminpw").await);

    let (status, body) = send(&h.app, request("PUT", "/admin/api/v1/users/bob/role/write", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(h.repo.get("bob").await.unwrap().unwrap().role, "write");

    let (status, _) = send(&h.app, request("PUT", "/admin/api/v1/users/bob/role/root", Some(&admin))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.app, request("DELETE", "/admin/api/v1/users/bob", Some(&admin))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&h.app, get("/admin/api/v1/users/bob", Some(&admin))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn issue_data_plane_token(app: &axum::Router, session: &str) -> String {
    let (status, body) = send(app, request("POST", "/admin/api/v1/token", Some(&bearer(session)))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    parsed["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn data_plane_token_gates_private_routes() {
    let h = harness(Strategy::Local, false).await;
    let bob = login(&h.app, "bob", "pw2").await;
    let token = issue_data_plane_token(&h.app, &bob).await;

    let (status, _) = send(&h.app, get("/private/gems/rack-3.0.0.gem", Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let basic = format!("Basic {}", BASE64.encode(format!("bob:{token}")));
    let (status, _) = send(&h.app, get("/private/specs.4.8.gz", Some(&basic))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&h.app, request("POST", "/private/api/v1/gems", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.app, get("/private/gems/rack-3.0.0.gem", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reissued_token_revokes_the_old_one() {
    let h = harness(Strategy::Local, false).await;
    let alice = login(&h.app, "alice", "pw1").await;
    let old = issue_data_plane_token(&h.app, &alice).await;
    let new = issue_data_plane_token(&h.app, &alice).await;

    let (status, _) = send(&h.app, request("POST", "/private/api/v1/gems", Some(&old))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&h.app, request("POST", "/private/api/v1/gems", Some(&new))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn vulnerable_download_is_blocked() {
    let h = harness(Strategy::Local, false).await;
    let token = h.tokens.issue_token("bob").await.unwrap();

    let (status, body) = send(&h.app, get("/private/gems/rack-2.1.0.gem", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "rack 2.1.0 blocked by CVE-2022-30123");

    let (status, _) = send(&h.app, get("/private/gems/rack-2.2.3.1.gem", Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn alternate_path_spellings_are_still_admission_checked() {
    let h = harness(Strategy::Local, false).await;
    let token = h.tokens.issue_token("bob").await.unwrap();

    for path in [
        "/private//gems/rack-2.1.0.gem",
        "/private/./gems/rack-2.1.0.gem",
        "/private/gems/rack-2.1.0%2Egem",
        "/private/gems/rack%2D2.1.0.gem",
        "/private/specs/../gems/rack-2.1.0.gem",
    ] {
        let (status, body) = send(&h.app, get(path, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        assert_eq!(body, "rack 2.1.0 blocked by CVE-2022-30123", "{path}");
    }

    let (status, _) = send(&h.app, get("/private/gems/rack-2.1.0%FF.gem", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn anonymous_read_skips_identity_only_for_reads() {
    let h = harness(Strategy::Local, true).await;

    let (status, _) = send(&h.app, get("/private/gems/rack-3.0.0.gem", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&h.app, get("/private/gems/rack-2.1.0.gem", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.app, request("POST", "/private/api/v1/gems", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_none_still_applies_admission() {
    let h = harness(Strategy::None, false).await;

    let (status, _) = send(&h.app, request("POST", "/private/api/v1/gems", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&h.app, get("/private/gems/rack-2.1.0.gem", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.app, get("/admin/api/v1/auth", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"none\""));

    let (status, _) = send(
        &h.app,
        json_post("/admin/api/v1/login", serde_json::json!({ "username": "admin", "password": "adminpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn github_session_uses_the_token_cache() {
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", "/login/oauth/access_token")
        .with_status(200)
        .with_body(r#"{"access_token":"gho_abc","token_type":"bearer"}"#)
        .expect(1)
        .create_async()
        .await;
    let user = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer gho_abc")
        .with_status(200)
        .with_body(r#"{"login":"octocat"}"#)
        .expect(1)
        .create_async()
        .await;
    let orgs = server
        .mock("GET", "/user/orgs")
        .with_status(200)
        .with_body(r#"[{"login":"ACME"},{"login":"other"}]"#)
        .expect(1)
        .create_async()
        .await;

    let h = harness(
        Strategy::GitHub {
            server_url: server.url(),
            required_orgs: vec!["acme".to_string()],
        },
        false,
    )
    .await;

    let (status, body) = send(&h.app, json_post("/admin/api/v1/login", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("client_id=cid"));

    let (status, body) = send(&h.app, get("/github/callback?code=abc", None)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session: serde_json::Value = serde_json::from_str(&body).unwrap();
    let session = bearer(session["token"].as_str().unwrap());

    for _ in 0..2 {
        let (status, body) = send(&h.app, get("/admin/api/v1/auth", Some(&session))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body.contains("octocat"));
    }

    exchange.assert_async().await;
    user.assert_async().await;
    orgs.assert_async().await;
    assert_eq!(h.repo.get("octocat").await.unwrap().unwrap().role, "read");
}

#[tokio::test]
async fn github_org_gate_rejects_outsiders() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login/oauth/access_token")
        .with_status(200)
        .with_body(r#"{"access_token":"gho_abc"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user")
        .with_status(200)
        .with_body(r#"{"login":"mallory"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user/orgs")
        .with_status(200)
        .with_body(r#"[{"login":"other"}]"#)
        .create_async()
        .await;

    let h = harness(
        Strategy::GitHub {
            server_url: server.url(),
            required_orgs: vec!["acme".to_string()],
        },
        false,
    )
    .await;

    let (status, _) = send(&h.app, get("/github/callback?code=abc", None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.repo.get("mallory").await.unwrap().is_none());

    let (status, _) = send(&h.app, get("/github/callback", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
