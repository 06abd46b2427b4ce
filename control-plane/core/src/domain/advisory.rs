// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Advisory Records and Severity Policy
//!
//! One [`AdvisoryRecord`] per file in the advisory database
//! (`gems/<name>/<id>.yml`). Records are immutable once loaded.
//!
//! Severity is derived from CVSS scores:
//!
//! | Score | CVSSv3 | CVSSv2 |
//! |-------|--------|--------|
//! | 0 / absent | none | none |
//! | 0.1 - 3.9 | low | low |
//! | 4.0 - 6.9 | medium | medium |
//! | 7.0 - 8.9 | high | high |
//! | 9.0 - 10.0 | critical | high |
//!
//! CVSSv3 wins when present; CVSSv2 is the fallback.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayResult;

/// gem name → advisories in database order
pub type AdvisoryIndex = HashMap<String, Vec<AdvisoryRecord>>;

/// Where advisories come from. Both methods block on disk and network I/O
/// and are run on the blocking pool by the admission engine.
pub trait AdvisorySource: Send + Sync {
    /// Bring the local copy up to date (clone if absent, pull if present).
    fn sync(&self) -> GatewayResult<()>;

    /// Read every advisory from the local copy into a fresh index.
    fn load(&self) -> GatewayResult<AdvisoryIndex>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedLinks {
    #[serde(default)]
    pub cve: Vec<String>,
    #[serde(default)]
    pub url: Vec<String>,
}

/// A published vulnerability for a single gem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub gem: String,

    #[serde(default)]
    pub cve: Option<String>,

    /// Advisories without a CVE carry a GHSA identifier instead
    #[serde(default)]
    pub ghsa: Option<String>,

    #[serde(default, with = "lenient_string")]
    pub date: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub cvss_v2: Option<f64>,

    #[serde(default)]
    pub cvss_v3: Option<f64>,

    #[serde(default)]
    pub patched_versions: Vec<String>,

    #[serde(default)]
    pub unaffected_versions: Vec<String>,

    #[serde(default)]
    pub related: RelatedLinks,
}

impl AdvisoryRecord {
    /// Identifier shown in block messages: `CVE-…`, then `GHSA-…`, then the gem name.
    pub fn identifier(&self) -> String {
        match (&self.cve, &self.ghsa) {
            (Some(cve), _) => format!("CVE-{}", cve.trim_start_matches("CVE-")),
            (None, Some(ghsa)) => format!("GHSA-{}", ghsa.trim_start_matches("GHSA-")),
            (None, None) => self.gem.clone(),
        }
    }

    pub fn severity(&self) -> Severity {
        match (self.cvss_v3.filter(|s| *s > 0.0), self.cvss_v2.filter(|s| *s > 0.0)) {
            (Some(v3), _) => Severity::from_cvss_v3(v3),
            (None, Some(v2)) => Severity::from_cvss_v2(v2),
            (None, None) => Severity::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_cvss_v3(score: f64) -> Self {
        if score <= 0.0 {
            Self::None
        } else if score < 4.0 {
            Self::Low
        } else if score < 7.0 {
            Self::Medium
        } else if score < 9.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    /// CVSSv2 has no critical band.
    pub fn from_cvss_v2(score: f64) -> Self {
        if score <= 0.0 {
            Self::None
        } else if score < 4.0 {
            Self::Low
        } else if score < 7.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Maximum acceptable severity for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityThreshold {
    /// Blocks every advisory with a non-none severity.
    Low,
    /// Allows low and medium.
    Medium,
    /// Allows low, medium and high.
    #[default]
    High,
    /// Accepts everything, including critical. This is the most permissive
    /// setting: operators who want to block critical advisories only must
    /// choose `high`.
    Critical,
}

impl SeverityThreshold {
    /// True when an advisory of `severity` may be admitted under this threshold.
    pub fn accepts(self, severity: Severity) -> bool {
        if severity == Severity::None {
            return true;
        }
        match self {
            Self::Critical => true,
            Self::Low => false,
            Self::Medium => severity <= Severity::Medium,
            Self::High => severity <= Severity::High,
        }
    }
}

impl FromStr for SeverityThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity threshold '{other}'")),
        }
    }
}

/// Advisory dates are written both as YAML dates and as quoted strings.
mod lenient_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_str(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Option::<serde_yaml::Value>::deserialize(d)?;
        Ok(match value {
            Some(serde_yaml::Value::String(s)) => Some(s),
            Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
            Some(serde_yaml::Value::Null) | None => None,
            Some(other) => serde_yaml::to_string(&other).ok().map(|s| s.trim().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v2: Option<f64>, v3: Option<f64>) -> AdvisoryRecord {
        AdvisoryRecord {
            gem: "rack".to_string(),
            cve: Some("2022-30123".to_string()),
            cvss_v2: v2,
            cvss_v3: v3,
            ..Default::default()
        }
    }

    #[test]
    fn test_cvss_v3_bands() {
        assert_eq!(record(None, Some(7.5)).severity(), Severity::High);
        assert_eq!(record(None, Some(3.9)).severity(), Severity::Low);
        assert_eq!(record(None, Some(4.0)).severity(), Severity::Medium);
        assert_eq!(record(None, Some(9.8)).severity(), Severity::Critical);
    }

    #[test]
    fn test_cvss_v2_fallback() {
        assert_eq!(record(Some(9.3), None).severity(), Severity::High);
        assert_eq!(record(Some(5.0), Some(0.0)).severity(), Severity::Medium);
        assert_eq!(record(None, None).severity(), Severity::None);
    }

    #[test]
    fn test_threshold_matrix() {
        assert!(!SeverityThreshold::Medium.accepts(Severity::High));
        assert!(SeverityThreshold::Medium.accepts(Severity::Medium));
        assert!(SeverityThreshold::High.accepts(Severity::High));
        assert!(!SeverityThreshold::High.accepts(Severity::Critical));
        assert!(!SeverityThreshold::Low.accepts(Severity::Low));
        assert!(SeverityThreshold::Low.accepts(Severity::None));
        assert!(SeverityThreshold::Critical.accepts(Severity::Critical));
    }

    #[test]
    fn test_parse_advisory_yaml() {
        let yaml = r#"
gem: actionpack
cve: 2023-22795
url: https://github.com/rails/rails/releases/tag/v7.0.4.1
title: ReDoS based DoS vulnerability in Action Dispatch
date: 2023-01-18
description: |
  There is a possible regular expression based DoS vulnerability
cvss_v3: 7.5
patched_versions:
  - "~> 5.2.8, >= 5.2.8.15"
  - ">= 7.0.4.1"
unaffected_versions:
  - "< 3.0.0"
related:
  url:
    - https://discuss.rubyonrails.org/t/82101
"#;
        let record: AdvisoryRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.gem, "actionpack");
        assert_eq!(record.identifier(), "CVE-2023-22795");
        assert_eq!(record.date.as_deref(), Some("2023-01-18"));
        assert_eq!(record.patched_versions.len(), 2);
        assert_eq!(record.related.url.len(), 1);
        assert!(record.related.cve.is_empty());
        assert_eq!(record.severity(), Severity::High);
    }

    #[test]
    fn test_threshold_from_str() {
        assert_eq!("Critical".parse::<SeverityThreshold>().unwrap(), SeverityThreshold::Critical);
        assert!("severe".parse::<SeverityThreshold>().is_err());
    }
}
