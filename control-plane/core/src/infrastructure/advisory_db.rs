// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Advisory Database
//!
//! Local git working copy of a ruby-advisory-db style repository, plus the
//! in-memory cache built from it.
//!
//! # Layout
//!
//! ```text
//! <db_dir>/gems/<gem-name>/<advisory-id>.yml
//! ```
//!
//! # Cache publication
//!
//! [`AdvisoryCache`] holds an `Arc` snapshot behind a lock. A rebuild builds
//! the complete index off to the side, then swaps the `Arc` in one write.
//! Readers clone the current `Arc` and never observe a half-built index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::Repository;
use parking_lot::RwLock;
use walkdir::WalkDir;

use crate::domain::advisory::{AdvisoryIndex, AdvisoryRecord, AdvisorySource};
use crate::domain::error::{GatewayError, GatewayResult};

// ============================================================================
// Git-backed source
// ============================================================================

pub struct GitAdvisoryDatabase {
    db_dir: PathBuf,
    repository_url: String,
}

impl GitAdvisoryDatabase {
    pub fn new(db_dir: impl Into<PathBuf>, repository_url: impl Into<String>) -> Self {
        Self {
            db_dir: db_dir.into(),
            repository_url: repository_url.into(),
        }
    }

    pub fn gems_dir(&self) -> PathBuf {
        self.db_dir.join("gems")
    }

    fn clone_fresh(&self) -> GatewayResult<()> {
        tracing::info!(url = %self.repository_url, dir = ?self.db_dir, "Cloning advisory database");
        Repository::clone(&self.repository_url, &self.db_dir)
            .map(|_| ())
            .map_err(|e| GatewayError::AdvisorySync(format!("clone {}: {}", self.repository_url, e.message())))
    }

    /// Fetch the checked-out branch from origin and fast-forward to it.
    fn pull(&self) -> Result<PullOutcome, git2::Error> {
        let repo = Repository::open(&self.db_dir)?;
        let branch = repo
            .head()?
            .shorthand()
            .map(str::to_string)
            .ok_or_else(|| git2::Error::from_str("HEAD is not on a named branch"))?;

        repo.find_remote("origin")?.fetch(&[branch.as_str()], None, None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }
        if !analysis.is_fast_forward() {
            return Err(git2::Error::from_str("local copy has diverged from origin"));
        }

        let refname = format!("refs/heads/{branch}");
        repo.find_reference(&refname)?
            .set_target(fetch_commit.id(), "gemward: fast-forward")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(PullOutcome::FastForwarded)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PullOutcome {
    UpToDate,
    FastForwarded,
}

impl AdvisorySource for GitAdvisoryDatabase {
    fn sync(&self) -> GatewayResult<()> {
        if !self.db_dir.join(".git").exists() {
            return self.clone_fresh();
        }
        match self.pull() {
            Ok(PullOutcome::UpToDate) => {
                tracing::info!("Advisory database is already up to date");
                Ok(())
            }
            Ok(PullOutcome::FastForwarded) => {
                tracing::info!("Advisory database updated");
                Ok(())
            }
            Err(e) => Err(GatewayError::AdvisorySync(format!("pull: {}", e.message()))),
        }
    }

    fn load(&self) -> GatewayResult<AdvisoryIndex> {
        load_advisories(&self.gems_dir())
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Walk `gems_dir` and parse every `*.yml` file. Records are grouped by
/// their directory name and ordered by file name. A malformed record is
/// logged and skipped; it never aborts the pass.
pub fn load_advisories(gems_dir: &Path) -> GatewayResult<AdvisoryIndex> {
    if !gems_dir.is_dir() {
        return Err(GatewayError::AdvisorySync(format!(
            "advisory directory {} does not exist",
            gems_dir.display()
        )));
    }

    let mut index = AdvisoryIndex::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(gems_dir)
        .min_depth(2)
        .max_depth(2)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable advisory entry");
                skipped += 1;
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let Some(gem) = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            continue;
        };

        match parse_advisory(path) {
            Ok(record) => index.entry(gem).or_default().push(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed advisory");
                skipped += 1;
            }
        }
    }

    tracing::debug!(gems = index.len(), skipped, "Advisory index built");
    Ok(index)
}

fn parse_advisory(path: &Path) -> GatewayResult<AdvisoryRecord> {
    let parse_err = |reason: String| GatewayError::AdvisoryParse {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| parse_err(e.to_string()))?;
    serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Default)]
pub struct AdvisoryCache {
    snapshot: RwLock<Arc<AdvisoryIndex>>,
}

impl AdvisoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index. The returned snapshot stays consistent even if a
    /// rebuild is published while the caller holds it.
    pub fn snapshot(&self) -> Arc<AdvisoryIndex> {
        self.snapshot.read().clone()
    }

    /// Publish a fully built index.
    pub fn replace(&self, index: AdvisoryIndex) {
        let index = Arc::new(index);
        *self.snapshot.write() = index;
    }

    pub fn advisories_for(&self, gem: &str) -> Option<Vec<AdvisoryRecord>> {
        self.snapshot().get(gem).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.snapshot().values().map(Vec::len).sum()
    }
}
