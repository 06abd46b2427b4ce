// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a gemward control plane, including:
// - Listener and private gem path
// - Authentication strategy (none / local / github) and session lifetimes
// - Policy file locations
// - Advisory database sync and severity threshold
// - Account database location
// - Optional Prometheus scrape listener
//
// Secret-valued fields accept "env:VAR_NAME" and are resolved at load time.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::advisory::SeverityThreshold;
use crate::domain::error::{GatewayError, GatewayResult};

/// Top-level configuration document (`gemward.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub advisories: AdvisoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// URL prefix under which gem artifacts are served
    #[serde(default = "default_private_gems_path")]
    pub private_gems_path: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    #[default]
    Local,
    Github,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Local => write!(f, "local"),
            Self::Github => write!(f, "github"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,

    /// HMAC secret for session tokens (supports "env:VAR_NAME")
    #[serde(default)]
    pub session_secret: Option<String>,

    /// Retired secrets still accepted for verification during rotation
    #[serde(default)]
    pub previous_session_secrets: Vec<String>,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_session_max_refresh")]
    pub session_max_refresh_secs: u64,

    /// Role given to accounts created on first GitHub login
    #[serde(default = "default_user_role")]
    pub default_user_role: String,

    #[serde(default)]
    pub allow_anonymous_read: bool,

    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,

    /// Externally supplied admin password (supports "env:VAR_NAME")
    #[serde(default)]
    pub admin_password: Option<String>,

    /// Declared `username:password` pairs for bulk provisioning
    #[serde(default)]
    pub local_users: Vec<String>,

    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub client_id: String,

    /// OAuth app secret (supports "env:VAR_NAME")
    #[serde(default)]
    pub client_secret: String,

    /// Users must belong to at least one of these organizations
    #[serde(default)]
    pub required_orgs: Vec<String>,

    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    #[serde(default = "default_github_oauth_url")]
    pub oauth_url: String,

    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_token_cache_ttl")]
    pub token_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Role relation model (YAML)
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Policy table (`p, role, path, method` lines)
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparsableVersionPolicy {
    /// Admit the download
    #[default]
    Allow,
    /// Refuse the download when the gem has any advisory
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub max_severity: SeverityThreshold,

    #[serde(default = "default_advisory_db_dir")]
    pub db_dir: PathBuf,

    #[serde(default = "default_advisory_repository")]
    pub repository_url: String,

    /// Absent means sync once at startup
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,

    #[serde(default)]
    pub unparsable_version: UnparsableVersionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database holding accounts and the data-plane token index
    #[serde(default = "default_accounts_db")]
    pub accounts_db: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus scrape listener; disabled when absent
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

// Default value functions
fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 2020))
}

fn default_private_gems_path() -> String {
    "/private".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    12 * 60 * 60
}

fn default_session_max_refresh() -> u64 {
    24 * 60 * 60
}

fn default_user_role() -> String {
    "read".to_string()
}

fn default_hash_cost() -> u32 {
    MIN_PASSWORD_HASH_COST
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_oauth_url() -> String {
    "https://github.com".to_string()
}

fn default_github_timeout() -> u64 {
    10
}

fn default_token_cache_ttl() -> u64 {
    300
}

fn default_advisory_db_dir() -> PathBuf {
    PathBuf::from("/var/lib/gemward/ruby-advisory-db")
}

fn default_accounts_db() -> PathBuf {
    PathBuf::from("/var/lib/gemward/accounts")
}

fn default_advisory_repository() -> String {
    "https://github.com/rubysec/ruby-advisory-db.git".to_string()
}

/// Production floor for bcrypt cost.
pub const MIN_PASSWORD_HASH_COST: u32 = 14;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            private_gems_path: default_private_gems_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::default(),
            session_secret: None,
            previous_session_secrets: Vec::new(),
            session_timeout_secs: default_session_timeout(),
            session_max_refresh_secs: default_session_max_refresh(),
            default_user_role: default_user_role(),
            allow_anonymous_read: false,
            password_hash_cost: default_hash_cost(),
            admin_password: None,
            local_users: Vec::new(),
            github: GitHubConfig::default(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            required_orgs: Vec::new(),
            api_url: default_github_api_url(),
            oauth_url: default_github_oauth_url(),
            timeout_secs: default_github_timeout(),
            token_cache_ttl_secs: default_token_cache_ttl(),
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_severity: SeverityThreshold::default(),
            db_dir: default_advisory_db_dir(),
            repository_url: default_advisory_repository(),
            sync_interval_secs: None,
            unparsable_version: UnparsableVersionPolicy::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            accounts_db: default_accounts_db(),
        }
    }
}

const POLICY_SEARCH_DIRS: [&str; 2] = ["/etc/gemward", "."];

impl PolicyConfig {
    /// Explicit path, else the first existing file in the search directories.
    pub fn resolve_model(&self) -> GatewayResult<PathBuf> {
        resolve_policy_file(self.model_path.as_deref(), "policy_model.yaml")
    }

    pub fn resolve_table(&self) -> GatewayResult<PathBuf> {
        resolve_policy_file(self.table_path.as_deref(), "policy_table.csv")
    }
}

fn resolve_policy_file(explicit: Option<&Path>, file_name: &str) -> GatewayResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    POLICY_SEARCH_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(file_name))
        .find(|p| p.exists())
        .ok_or_else(|| GatewayError::Configuration(format!("unable to locate {file_name}")))
}

impl GatewayConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> GatewayResult<Self> {
        let mut config: Self =
            serde_yaml::from_str(yaml).map_err(|e| GatewayError::Configuration(e.to_string()))?;
        config.resolve_secrets()?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GEMWARD_CONFIG_PATH environment variable
    /// 2. ./gemward.yaml (working directory)
    /// 3. /etc/gemward/gemward.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GEMWARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./gemward.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/gemward/gemward.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> GatewayResult<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(pw) = std::env::var("GEMWARD_ADMIN_PASSWORD") {
            if !pw.is_empty() {
                tracing::info!("Environment override: GEMWARD_ADMIN_PASSWORD is set");
                self.auth.admin_password = Some(pw);
            }
        }
        if let Ok(users) = std::env::var("GEMWARD_LOCAL_USERS") {
            let declared: Vec<String> = users
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            tracing::info!(count = declared.len(), "Environment override: GEMWARD_LOCAL_USERS");
            self.auth.local_users.extend(declared);
        }
    }

    fn resolve_secrets(&mut self) -> GatewayResult<()> {
        if let Some(secret) = self.auth.session_secret.take() {
            self.auth.session_secret = Some(resolve_env_ref(&secret)?);
        }
        self.auth.previous_session_secrets = self
            .auth
            .previous_session_secrets
            .iter()
            .map(|s| resolve_env_ref(s))
            .collect::<GatewayResult<_>>()?;
        if let Some(pw) = self.auth.admin_password.take() {
            self.auth.admin_password = Some(resolve_env_ref(&pw)?);
        }
        self.auth.github.client_secret = resolve_env_ref(&self.auth.github.client_secret)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> GatewayResult<()> {
        let auth = &self.auth;
        let bail = |msg: String| -> GatewayResult<()> { Err(GatewayError::Configuration(msg)) };

        if auth.auth_type != AuthType::None
            && auth.session_secret.as_deref().map_or(true, str::is_empty)
        {
            return bail(format!("auth.session_secret is required for auth type '{}'", auth.auth_type));
        }

        if auth.password_hash_cost < MIN_PASSWORD_HASH_COST {
            return bail(format!(
                "auth.password_hash_cost must be at least {MIN_PASSWORD_HASH_COST}, got {}",
                auth.password_hash_cost
            ));
        }

        if auth.session_max_refresh_secs < auth.session_timeout_secs {
            return bail("auth.session_max_refresh_secs must not be shorter than session_timeout_secs".to_string());
        }

        if auth.default_user_role.is_empty() {
            return bail("auth.default_user_role cannot be empty".to_string());
        }

        if auth.auth_type == AuthType::Github {
            if auth.github.client_id.is_empty() || auth.github.client_secret.is_empty() {
                return bail("auth.github.client_id and client_secret are required for auth type 'github'".to_string());
            }
            if auth.github.required_orgs.is_empty() {
                tracing::warn!(
                    "auth.github.required_orgs is empty: every GitHub login will be denied"
                );
            }
        }

        if !self.server.private_gems_path.starts_with('/') {
            return bail("server.private_gems_path must start with '/'".to_string());
        }

        Ok(())
    }
}

/// Resolve an `env:VAR_NAME` reference; other values pass through unchanged.
pub fn resolve_env_ref(value: &str) -> GatewayResult<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).map_err(|_| {
            GatewayError::Configuration(format!("environment variable {var} is not set"))
        }),
        None => Ok(value.to_string()),
    }
}
