// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Composition root and HTTP server.
//!
//! Startup order matters: the access policy must load before anything
//! listens, the admin account exists before the first login, and the
//! advisory cache is populated before the first download is admitted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gemward_core::application::accounts::AccountAdministration;
use gemward_core::application::admission::VulnerabilityAdmissionEngine;
use gemward_core::application::authorization::AuthorizationGate;
use gemward_core::application::data_plane_tokens::DataPlaneTokenStore;
use gemward_core::application::github_auth::GitHubOAuthBridge;
use gemward_core::application::local_auth::LocalPasswordAuth;
use gemward_core::domain::config::{AuthType, GatewayConfig};
use gemward_core::domain::repository::AccountRepository;
use gemward_core::domain::session::SessionCodec;
use gemward_core::infrastructure::repositories::SledAccountRepository;
use gemward_core::infrastructure::{
    AdvisoryCache, BcryptHasher, FilePolicyOracle, GitAdvisoryDatabase, GitHubClient, GitHubTokenCache,
    JwtSessionCodec,
};
use gemward_core::presentation::api::{self, AppState, AuthStrategy};

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    info!(
        auth = %config.auth.auth_type,
        listen = %config.server.listen,
        advisories = config.advisories.enabled,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics.listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Metrics listener started");
    }

    let accounts_db = &config.storage.accounts_db;
    let repo = SledAccountRepository::open(accounts_db)
        .with_context(|| format!("Failed to open account database {}", accounts_db.display()))?;

    let gateway = build_gateway(&config, Arc::new(repo)).await?;
    let _tasks = gateway.start_background_tasks(&config);

    let app = api::app(gateway.state, Duration::from_secs(config.server.request_timeout_secs));
    let addr = config.server.listen;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("gemward listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("gemward shutting down");
    Ok(())
}

/// Everything the router needs, plus the handles that background tasks
/// share with it.
pub struct Gateway {
    pub state: AppState,
    pub admission: Arc<VulnerabilityAdmissionEngine>,
    pub token_cache: Option<Arc<GitHubTokenCache>>,
}

impl Gateway {
    /// Advisory resync and token cache purge run on independent timers.
    fn start_background_tasks(&self, config: &GatewayConfig) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        let interval = config
            .advisories
            .sync_interval_secs
            .filter(|_| config.advisories.enabled)
            .map(Duration::from_secs);
        if let Some(interval) = interval {
            info!(interval_secs = interval.as_secs(), "Scheduled advisory sync enabled");
            tasks.push(Arc::clone(&self.admission).spawn_periodic_sync(interval));
        }

        if let Some(cache) = &self.token_cache {
            let every = Duration::from_secs(config.auth.github.token_cache_ttl_secs.max(1));
            tasks.push(spawn_token_cache_purge(Arc::clone(cache), every));
        }

        tasks
    }
}

pub async fn build_gateway(config: &GatewayConfig, repo: Arc<dyn AccountRepository>) -> Result<Gateway> {
    let model = config.policy.resolve_model().context("Policy model not found")?;
    let table = config.policy.resolve_table().context("Policy table not found")?;
    let oracle = FilePolicyOracle::load(&model, &table).context("Failed to load access policy")?;
    let authorization = AuthorizationGate::new(Arc::new(oracle));
    info!(model = %model.display(), table = %table.display(), "Access policy loaded");

    if !authorization.knows_role(&config.auth.default_user_role) {
        bail!(
            "auth.default_user_role '{}' is not defined in the policy model",
            config.auth.default_user_role
        );
    }

    let mut token_cache = None;
    let strategy = match config.auth.auth_type {
        AuthType::None => {
            warn!("Authentication is disabled; only vulnerability admission is enforced");
            AuthStrategy::None
        }
        AuthType::Local => {
            let local = Arc::new(LocalPasswordAuth::new(
                Arc::clone(&repo),
                session_codec(config)?,
                BcryptHasher::new(config.auth.password_hash_cost),
                config.auth.default_user_role.clone(),
            ));
            let outcome = local
                .bootstrap_admin(config.auth.admin_password.as_deref())
                .await
                .context("Failed to bootstrap admin account")?;
            info!(?outcome, "Admin account ready");

            if !config.auth.local_users.is_empty() {
                local
                    .provision(&config.auth.local_users)
                    .await
                    .context("Failed to provision local users")?;
            }
            AuthStrategy::Local(local)
        }
        AuthType::Github => {
            let github = &config.auth.github;
            let cache = Arc::new(GitHubTokenCache::new(Duration::from_secs(github.token_cache_ttl_secs)));
            token_cache = Some(Arc::clone(&cache));
            let client = GitHubClient::new(github).context("Failed to build GitHub client")?;
            AuthStrategy::GitHub(Arc::new(GitHubOAuthBridge::new(
                Arc::new(client),
                Arc::clone(&repo),
                session_codec(config)?,
                cache,
                &github.required_orgs,
                config.auth.default_user_role.clone(),
            )))
        }
    };

    let advisories = &config.advisories;
    let admission = Arc::new(VulnerabilityAdmissionEngine::new(
        Arc::new(GitAdvisoryDatabase::new(&advisories.db_dir, &advisories.repository_url)),
        Arc::new(AdvisoryCache::new()),
        advisories,
    ));
    if advisories.enabled {
        match admission.sync_and_rebuild().await {
            Ok(records) => info!(records, db_dir = %advisories.db_dir.display(), "Advisory database ready"),
            Err(e) => error!(error = %e, "Advisory database unavailable; downloads are admitted unchecked"),
        }
    }

    let state = AppState {
        strategy,
        authorization: authorization.clone(),
        tokens: Arc::new(DataPlaneTokenStore::new(Arc::clone(&repo))),
        admission: Arc::clone(&admission),
        accounts: Arc::new(AccountAdministration::new(repo, authorization)),
        allow_anonymous_read: config.auth.allow_anonymous_read,
        private_gems_path: config.server.private_gems_path.trim_end_matches('/').to_string(),
    };

    Ok(Gateway {
        state,
        admission,
        token_cache,
    })
}

fn session_codec(config: &GatewayConfig) -> Result<Arc<dyn SessionCodec>> {
    let auth = &config.auth;
    let secret = auth
        .session_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("auth.session_secret is required")?;
    let codec = JwtSessionCodec::new(
        secret,
        &auth.previous_session_secrets,
        auth.session_timeout_secs,
        auth.session_max_refresh_secs,
    )
    .context("Failed to initialise session codec")?;
    Ok(Arc::new(codec))
}

fn spawn_token_cache_purge(cache: Arc<GitHubTokenCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            tracing::debug!(purged, "Purged expired GitHub tokens");
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
