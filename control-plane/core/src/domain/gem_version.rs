// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Gem Versions and Requirements
//!
//! RubyGems version semantics, as used by advisory `patched_versions` and
//! `unaffected_versions` constraints.
//!
//! - A version is a run of numeric and alphabetic segments: `1.2.0.rc1`
//!   splits into `[1, 2, 0, "rc", 1]`. A `-` is read as `.pre.`.
//! - Any alphabetic segment makes the version a prerelease, which sorts
//!   below the release it precedes (`1.0.a < 1.0`).
//! - Trailing zeros are insignificant (`1.0 == 1`).
//! - `~> X.Y` means `>= X.Y` and `< (X+1)`; `~> X.Y.Z` means `>= X.Y.Z`
//!   and `< X.(Y+1)`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version string '{0}'")]
    MalformedVersion(String),

    #[error("malformed requirement '{0}'")]
    MalformedRequirement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Num(u64),
    Str(String),
}

impl Segment {
    fn cmp_segment(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Num(a), Segment::Num(b)) => a.cmp(b),
            (Segment::Str(a), Segment::Str(b)) => a.cmp(b),
            (Segment::Str(_), Segment::Num(_)) => Ordering::Less,
            (Segment::Num(_), Segment::Str(_)) => Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GemVersion {
    original: String,
    segments: Vec<Segment>,
}

impl GemVersion {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                original: "0".to_string(),
                segments: vec![Segment::Num(0)],
            });
        }
        if !is_well_formed(trimmed) {
            return Err(VersionError::MalformedVersion(input.to_string()));
        }

        let normalized = trimmed.replace('-', ".pre.");
        let mut segments = Vec::new();
        let mut chars = normalized.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut run = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    run.push(d);
                    chars.next();
                }
                let n = run
                    .parse::<u64>()
                    .map_err(|_| VersionError::MalformedVersion(input.to_string()))?;
                segments.push(Segment::Num(n));
            } else if c.is_ascii_alphabetic() {
                let mut run = String::new();
                while let Some(&a) = chars.peek().filter(|a| a.is_ascii_alphabetic()) {
                    run.push(a);
                    chars.next();
                }
                segments.push(Segment::Str(run));
            } else {
                chars.next();
            }
        }

        Ok(Self {
            original: trimmed.to_string(),
            segments,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Str(_)))
    }

    /// The release this version precedes: prerelease segments dropped.
    pub fn release(&self) -> GemVersion {
        if !self.is_prerelease() {
            return self.clone();
        }
        let segments: Vec<Segment> = self
            .segments
            .iter()
            .take_while(|s| matches!(s, Segment::Num(_)))
            .cloned()
            .collect();
        Self::from_segments(segments)
    }

    /// Upper bound used by `~>`: drop prerelease segments, drop the last
    /// segment when more than one remains, increment the new last segment.
    pub fn bump(&self) -> GemVersion {
        let mut segments: Vec<Segment> = self.segments.clone();
        while segments.iter().any(|s| matches!(s, Segment::Str(_))) {
            segments.pop();
        }
        if segments.len() > 1 {
            segments.pop();
        }
        match segments.last_mut() {
            Some(Segment::Num(n)) => *n = n.saturating_add(1),
            _ => segments = vec![Segment::Num(1)],
        }
        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let original = segments
            .iter()
            .map(|s| match s {
                Segment::Num(n) => n.to_string(),
                Segment::Str(s) => s.clone(),
            })
            .collect::<Vec<_>>()
            .join(".");
        Self { original, segments }
    }

    /// Numeric and string parts, each with trailing zeros removed.
    fn canonical_segments(&self) -> Vec<Segment> {
        let split = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Str(_)))
            .unwrap_or(self.segments.len());
        let (numeric, string) = self.segments.split_at(split);
        let mut canonical = strip_trailing_zeros(numeric);
        canonical.extend(strip_trailing_zeros(string));
        canonical
    }
}

fn strip_trailing_zeros(segments: &[Segment]) -> Vec<Segment> {
    let mut out = segments.to_vec();
    while matches!(out.last(), Some(Segment::Num(0))) {
        out.pop();
    }
    out
}

fn is_well_formed(s: &str) -> bool {
    let (main, pre) = match s.split_once('-') {
        Some((main, pre)) => (main, Some(pre)),
        None => (s, None),
    };
    let mut parts = main.split('.');
    let leading_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !leading_ok || !parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric())) {
        return false;
    }
    match pre {
        None => true,
        Some(pre) => pre
            .split('.')
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')),
    }
}

impl Ord for GemVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.canonical_segments();
        let rhs = other.canonical_segments();
        let len = lhs.len().max(rhs.len());
        let zero = Segment::Num(0);
        for i in 0..len {
            let a = lhs.get(i).unwrap_or(&zero);
            let b = rhs.get(i).unwrap_or(&zero);
            match a.cmp_segment(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for GemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GemVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GemVersion {}

impl fmt::Display for GemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for GemVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Pessimistic,
}

impl Operator {
    fn satisfied(self, version: &GemVersion, bound: &GemVersion) -> bool {
        match self {
            Operator::Eq => version == bound,
            Operator::NotEq => version != bound,
            Operator::Gt => version > bound,
            Operator::Lt => version < bound,
            Operator::GtEq => version >= bound,
            Operator::LtEq => version <= bound,
            Operator::Pessimistic => version >= bound && version.release() < bound.bump(),
        }
    }
}

/// A comma-joined conjunction of `op version` constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    constraints: Vec<(Operator, GemVersion)>,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let constraints = input
            .split(',')
            .map(|part| parse_constraint(part).ok_or_else(|| VersionError::MalformedRequirement(input.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { constraints })
    }

    pub fn is_satisfied_by(&self, version: &GemVersion) -> bool {
        self.constraints.iter().all(|(op, bound)| op.satisfied(version, bound))
    }

    /// Parse and evaluate in one step. A requirement that does not parse
    /// never matches.
    pub fn matches(requirement: &str, version: &GemVersion) -> bool {
        match Self::parse(requirement) {
            Ok(req) => req.is_satisfied_by(version),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparsable requirement");
                false
            }
        }
    }
}

fn parse_constraint(part: &str) -> Option<(Operator, GemVersion)> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    // Longest operators first so `>=` is not read as `>`.
    const OPERATORS: [(&str, Operator); 7] = [
        ("~>", Operator::Pessimistic),
        (">=", Operator::GtEq),
        ("<=", Operator::LtEq),
        ("!=", Operator::NotEq),
        ("=", Operator::Eq),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|(token, op)| part.strip_prefix(token).map(|rest| (*op, rest)))
        .unwrap_or((Operator::Eq, part));
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    GemVersion::parse(rest).ok().map(|v| (op, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> GemVersion {
        GemVersion::parse(s).unwrap()
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.0") == v("1"));
        assert!(v("1.0.0") == v("1"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.0.a") < v("1.0"));
        assert!(v("1.0.rc1") < v("1.0.rc2"));
        assert!(v("1.0.beta") < v("1.0.rc"));
        assert!(v("4.2.1") > v("4.2.0"));
        assert!(v("5.2.4.3") > v("5.2.4"));
        assert!(v("1.0-1") < v("1.0"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(GemVersion::parse("not-a-version").is_err());
        assert!(GemVersion::parse("1..2").is_err());
        assert!(GemVersion::parse("1.2 3").is_err());
        assert!(GemVersion::parse("").is_ok());
    }

    #[test]
    fn test_bump_and_release() {
        assert_eq!(v("5.2.4").bump(), v("5.3"));
        assert_eq!(v("5.2").bump(), v("6"));
        assert_eq!(v("5").bump(), v("6"));
        assert_eq!(v("1.0.rc1").bump(), v("2"));
        assert_eq!(v("1.2.rc1").release(), v("1.2"));
    }

    #[test]
    fn test_pessimistic_operator() {
        let req = Requirement::parse("~> 5.2.4").unwrap();
        assert!(req.is_satisfied_by(&v("5.2.4")));
        assert!(req.is_satisfied_by(&v("5.2.9")));
        assert!(!req.is_satisfied_by(&v("5.3.0")));
        assert!(!req.is_satisfied_by(&v("5.2.3")));

        let req = Requirement::parse("~> 2.0").unwrap();
        assert!(req.is_satisfied_by(&v("2.9")));
        assert!(!req.is_satisfied_by(&v("3.0")));
    }

    #[test]
    fn test_conjunction() {
        let req = Requirement::parse("~> 5.2.4, >= 5.2.4.3").unwrap();
        assert!(req.is_satisfied_by(&v("5.2.4.3")));
        assert!(req.is_satisfied_by(&v("5.2.5")));
        assert!(!req.is_satisfied_by(&v("5.2.4.2")));
        assert!(!req.is_satisfied_by(&v("6.0.0")));
    }

    #[test]
    fn test_simple_operators() {
        assert!(Requirement::matches(">= 4.2.1", &v("4.2.2")));
        assert!(!Requirement::matches(">= 4.2.1", &v("4.2.0")));
        assert!(Requirement::matches("< 3.0.0", &v("2.9.9")));
        assert!(Requirement::matches("= 1.0", &v("1")));
        assert!(Requirement::matches("1.0", &v("1.0.0")));
        assert!(Requirement::matches("!= 1.0", &v("1.1")));
        assert!(Requirement::matches("<= 1.0", &v("1.0")));
        assert!(Requirement::matches("> 1.0", &v("1.0.1")));
    }

    #[test]
    fn test_unparsable_requirement_never_matches() {
        assert!(!Requirement::matches(">= banana!", &v("1.0")));
        assert!(!Requirement::matches("", &v("1.0")));
        assert!(!Requirement::matches(">=", &v("1.0")));
    }
}
