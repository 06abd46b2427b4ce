// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! File-backed [`PolicyOracle`].
//!
//! Two sources, both required at startup:
//!
//! **Relation model** (YAML). Each role lists the roles whose grants it
//! inherits:
//!
//! ```yaml
//! roles:
//!   admin: [write]
//!   write: [read]
//!   read: []
//! ```
//!
//! **Policy table**. One grant per line, `#` comments allowed:
//!
//! ```text
//! p, read,  /private/*,           GET|HEAD
//! p, write, /private/api/v1/gems, POST
//! p, admin, /admin/api/v1/*,      *
//! ```
//!
//! `*` in a path matches any run of characters; a method of `*` matches
//! every method.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::domain::policy::{PolicyError, PolicyOracle};

#[derive(Debug, Deserialize)]
struct RelationModel {
    roles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
enum MethodPattern {
    Any,
    OneOf(Vec<String>),
}

impl MethodPattern {
    fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self::Any);
        }
        let methods: Vec<String> = raw.split('|').map(|m| m.trim().to_ascii_uppercase()).collect();
        if methods.iter().any(|m| m.is_empty() || !m.chars().all(|c| c.is_ascii_alphabetic())) {
            return Err(format!("invalid method pattern '{raw}'"));
        }
        Ok(Self::OneOf(methods))
    }

    fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

#[derive(Debug)]
struct Grant {
    role: String,
    path: Regex,
    methods: MethodPattern,
}

pub struct FilePolicyOracle {
    /// role → the role itself plus everything it inherits
    effective_roles: HashMap<String, BTreeSet<String>>,
    grants: Vec<Grant>,
}

impl FilePolicyOracle {
    pub fn load(model_path: &Path, table_path: &Path) -> Result<Self, PolicyError> {
        let model = read_source(model_path)?;
        let table = read_source(table_path)?;
        Self::from_sources(&model, &table)
    }

    pub fn from_sources(model: &str, table: &str) -> Result<Self, PolicyError> {
        let model: RelationModel =
            serde_yaml::from_str(model).map_err(|e| PolicyError::Model(e.to_string()))?;
        let effective_roles = resolve_inheritance(&model.roles)?;
        let grants = parse_table(table, &effective_roles)?;
        tracing::info!(
            roles = effective_roles.len(),
            grants = grants.len(),
            "Policy loaded"
        );
        Ok(Self {
            effective_roles,
            grants,
        })
    }
}

impl PolicyOracle for FilePolicyOracle {
    fn enforce(&self, role: &str, resource: &str, action: &str) -> Result<bool, PolicyError> {
        let Some(roles) = self.effective_roles.get(role) else {
            return Ok(false);
        };
        Ok(self.grants.iter().any(|g| {
            roles.contains(&g.role) && g.methods.matches(action) && g.path.is_match(resource)
        }))
    }

    fn knows_subject(&self, role: &str) -> bool {
        self.effective_roles.contains_key(role)
    }
}

fn read_source(path: &Path) -> Result<String, PolicyError> {
    std::fs::read_to_string(path).map_err(|e| PolicyError::Source {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn resolve_inheritance(
    roles: &BTreeMap<String, Vec<String>>,
) -> Result<HashMap<String, BTreeSet<String>>, PolicyError> {
    if roles.is_empty() {
        return Err(PolicyError::Model("no roles defined".to_string()));
    }
    for (role, parents) in roles {
        if let Some(unknown) = parents.iter().find(|p| !roles.contains_key(*p)) {
            return Err(PolicyError::Model(format!(
                "role '{role}' inherits unknown role '{unknown}'"
            )));
        }
    }

    let mut resolved = HashMap::new();
    for role in roles.keys() {
        let mut effective = BTreeSet::new();
        let mut path = Vec::new();
        collect(role, roles, &mut effective, &mut path)?;
        resolved.insert(role.clone(), effective);
    }
    Ok(resolved)
}

fn collect(
    role: &str,
    roles: &BTreeMap<String, Vec<String>>,
    effective: &mut BTreeSet<String>,
    path: &mut Vec<String>,
) -> Result<(), PolicyError> {
    if path.iter().any(|r| r == role) {
        path.push(role.to_string());
        return Err(PolicyError::Model(format!(
            "inheritance cycle: {}",
            path.join(" -> ")
        )));
    }
    effective.insert(role.to_string());
    path.push(role.to_string());
    for parent in roles.get(role).into_iter().flatten() {
        collect(parent, roles, effective, path)?;
    }
    path.pop();
    Ok(())
}

fn parse_table(
    table: &str,
    roles: &HashMap<String, BTreeSet<String>>,
) -> Result<Vec<Grant>, PolicyError> {
    let mut grants = Vec::new();
    for (idx, raw) in table.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let rule_err = |reason: String| PolicyError::Rule {
            line: idx + 1,
            reason,
        };
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [kind, role, path, methods] = fields.as_slice() else {
            return Err(rule_err(format!("expected 4 fields, found {}", fields.len())));
        };
        if *kind != "p" {
            return Err(rule_err(format!("unsupported rule type '{kind}'")));
        }
        if !roles.contains_key(*role) {
            return Err(rule_err(format!("unknown role '{role}'")));
        }
        grants.push(Grant {
            role: role.to_string(),
            path: path_pattern(path).map_err(|e| rule_err(e.to_string()))?,
            methods: MethodPattern::parse(methods).map_err(rule_err)?,
        });
    }
    Ok(grants)
}

fn path_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
}
