// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Vulnerability Admission
//!
//! Decides whether a gem download may proceed given the cached advisory
//! database.
//!
//! For each advisory on the requested gem:
//!
//! 1. patched if the version satisfies any `patched_versions` entry
//! 2. unaffected if it satisfies any `unaffected_versions` entry
//! 3. otherwise it blocks when its severity exceeds the configured threshold
//!
//! Sync and rebuild touch git and the filesystem, so both run on the
//! blocking pool. A failed sync is logged and the previous working copy is
//! reloaded as-is.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;

use crate::domain::advisory::{AdvisoryRecord, AdvisorySource, SeverityThreshold};
use crate::domain::config::{AdvisoryConfig, UnparsableVersionPolicy};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::gem_version::{GemVersion, Requirement};
use crate::infrastructure::advisory_db::AdvisoryCache;

static GEM_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)-(?P<version>\d[0-9A-Za-z.]*)(?:-(?P<platform>[A-Za-z_][\w.-]*))?$")
        .expect("valid gem file name pattern")
});

pub struct VulnerabilityAdmissionEngine {
    source: Arc<dyn AdvisorySource>,
    cache: Arc<AdvisoryCache>,
    enabled: bool,
    threshold: SeverityThreshold,
    unparsable: UnparsableVersionPolicy,
}

impl VulnerabilityAdmissionEngine {
    pub fn new(source: Arc<dyn AdvisorySource>, cache: Arc<AdvisoryCache>, config: &AdvisoryConfig) -> Self {
        Self {
            source,
            cache,
            enabled: config.enabled,
            threshold: config.max_severity,
            unparsable: config.unparsable_version,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn sync(&self) -> GatewayResult<()> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.sync())
            .await
            .map_err(|e| GatewayError::Internal(format!("advisory sync task failed: {e}")))?
    }

    /// Reload the index from the local copy and publish it in one swap.
    pub async fn rebuild(&self) -> GatewayResult<usize> {
        let source = Arc::clone(&self.source);
        let index = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(|e| GatewayError::Internal(format!("advisory rebuild task failed: {e}")))??;

        let gems = index.len();
        self.cache.replace(index);
        let records = self.cache.record_count();
        metrics::gauge!("gemward_advisory_records").set(records as f64);
        tracing::info!(gems, records, "Advisory cache rebuilt");
        Ok(records)
    }

    /// Sync, then rebuild. A sync failure is non-fatal.
    pub async fn sync_and_rebuild(&self) -> GatewayResult<usize> {
        if let Err(e) = self.sync().await {
            metrics::counter!("gemward_advisory_sync_failures_total").increment(1);
            tracing::warn!(error = %e, "Advisory sync failed, serving the last local copy");
        }
        self.rebuild().await
    }

    /// Advisories that block `gem` at `version`, in database order.
    pub fn decide(&self, gem: &str, version: &str) -> GatewayResult<Vec<AdvisoryRecord>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let snapshot = self.cache.snapshot();
        let Some(advisories) = snapshot.get(gem) else {
            return Ok(Vec::new());
        };

        let version = match GemVersion::parse(version) {
            Ok(v) => v,
            Err(e) => return self.on_unparsable(gem, version, &e.to_string()),
        };

        let blocking = advisories
            .iter()
            .filter(|advisory| {
                !is_patched(advisory, &version)
                    && !is_unaffected(advisory, &version)
                    && !self.threshold.accepts(advisory.severity())
            })
            .cloned()
            .collect();
        Ok(blocking)
    }

    /// Admission check for a download of `file_name` (`rails-7.0.4.gem`).
    pub fn admit_file(&self, file_name: &str) -> GatewayResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some((gem, version)) = parse_gem_file_name(file_name) else {
            return self
                .on_unparsable(file_name, "", "file name has no version")
                .map(|_| ());
        };

        let blocking = self.decide(&gem, &version)?;
        if blocking.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = blocking.iter().map(AdvisoryRecord::identifier).collect();
        let ids = ids.join(", ");
        metrics::counter!("gemward_admission_blocked_total").increment(1);
        tracing::warn!(gem = %gem, version = %version, advisories = %ids, "Blocked vulnerable gem");
        Err(GatewayError::Forbidden(format!("{gem} {version} blocked by {ids}")))
    }

    fn on_unparsable(&self, gem: &str, version: &str, reason: &str) -> GatewayResult<Vec<AdvisoryRecord>> {
        match self.unparsable {
            UnparsableVersionPolicy::Allow => {
                tracing::warn!(gem, version, reason, "Unparsable gem version, admitting");
                Ok(Vec::new())
            }
            UnparsableVersionPolicy::Block => {
                tracing::warn!(gem, version, reason, "Unparsable gem version, refusing");
                Err(GatewayError::VersionParse {
                    gem: gem.to_string(),
                    version: version.to_string(),
                })
            }
        }
    }

    /// Resync on a fixed interval. The first tick fires after one full
    /// interval since startup already synced.
    pub fn spawn_periodic_sync(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.sync_and_rebuild().await {
                    tracing::error!(error = %e, "Scheduled advisory rebuild failed");
                }
            }
        })
    }
}

fn is_patched(advisory: &AdvisoryRecord, version: &GemVersion) -> bool {
    advisory
        .patched_versions
        .iter()
        .any(|req| Requirement::matches(req, version))
}

fn is_unaffected(advisory: &AdvisoryRecord, version: &GemVersion) -> bool {
    advisory
        .unaffected_versions
        .iter()
        .any(|req| Requirement::matches(req, version))
}

/// Split `name-version[-platform].gem` into `(name, version)`. Anything
/// that is not a single path segment is not a gem file.
pub fn parse_gem_file_name(file_name: &str) -> Option<(String, String)> {
    if file_name.contains('/') {
        return None;
    }
    let stem = file_name.strip_suffix(".gem").unwrap_or(file_name);
    let caps = GEM_FILE_NAME.captures(stem)?;
    Some((caps["name"].to_string(), caps["version"].to_string()))
}
