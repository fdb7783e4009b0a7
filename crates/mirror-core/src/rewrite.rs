//! Internal dependency detection
//!
//! A dependency is internal when its name is mirrored here and its
//! constraint points at a git location we serve: either it contains the
//! mirrored entry's remote, or it matches an internal host pattern. Internal
//! constraints are replaced with [`WILDCARD`] so clients resolve them
//! against this registry instead of cloning from git themselves.

use std::collections::BTreeMap;

use mirror_meta::RepositoryTable;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Constraint written in place of an internal git reference.
pub const WILDCARD: &str = "*";

/// Decides which dependency constraints get rewritten.
#[derive(Debug, Clone, Default)]
pub struct DependencyRewriter {
    /// Mirrored package name to its remote
    remotes: BTreeMap<String, String>,
    patterns: Vec<Regex>,
}

impl DependencyRewriter {
    /// Build from the repository table and configured host patterns.
    ///
    /// The host of every mirrored remote is added as a pattern of its own.
    ///
    /// # Errors
    ///
    /// Fails when a configured pattern is not a valid regex.
    pub fn new(table: &RepositoryTable, internal_hosts: &[String]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(internal_hosts.len());
        for pattern in internal_hosts {
            let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            patterns.push(regex);
        }

        let mut hosts: Vec<String> = table.iter().filter_map(|e| remote_host(&e.remote)).collect();
        hosts.sort();
        hosts.dedup();
        for host in hosts {
            // An escaped literal always compiles.
            if let Ok(regex) = Regex::new(&regex::escape(&host)) {
                patterns.push(regex);
            }
        }

        let remotes = table
            .iter()
            .map(|e| (e.name.clone(), e.remote.clone()))
            .collect();

        Ok(Self { remotes, patterns })
    }

    /// Whether `constraint` on dependency `name` refers to a mirrored repository.
    pub fn is_internal(&self, name: &str, constraint: &str) -> bool {
        let Some(remote) = self.remotes.get(name) else {
            return false;
        };
        constraint.contains(remote.as_str()) || self.patterns.iter().any(|p| p.is_match(constraint))
    }

    /// Rewrite internal constraints in a `dependencies` object in place.
    ///
    /// Entry order is kept. Returns the names that were rewritten.
    pub fn rewrite(&self, dependencies: &mut Map<String, Value>) -> Vec<String> {
        let mut rewritten = Vec::new();
        for (name, value) in dependencies.iter_mut() {
            let Some(constraint) = value.as_str() else {
                continue;
            };
            if constraint != WILDCARD && self.is_internal(name, constraint) {
                tracing::debug!(dependency = %name, constraint = %constraint, "Rewriting internal dependency");
                *value = Value::String(WILDCARD.to_string());
                rewritten.push(name.clone());
            }
        }
        rewritten
    }
}

/// Host part of a git remote, without user or port.
///
/// Handles URLs (`ssh://git@host:7999/path`) and scp-style addresses
/// (`git@host:path`). Local paths have no host.
fn remote_host(remote: &str) -> Option<String> {
    let authority = match remote.split_once("://") {
        Some((scheme, rest)) => {
            if scheme == "file" {
                return None;
            }
            rest.split('/').next()?
        }
        None => {
            if remote.starts_with('/') || remote.starts_with('.') {
                return None;
            }
            let (authority, _) = remote.split_once(':')?;
            if authority.contains('/') {
                return None;
            }
            authority
        }
    };

    let host = authority.rsplit('@').next()?;
    let host = match host.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host,
    };
    (!host.is_empty()).then(|| host.to_string())
}
