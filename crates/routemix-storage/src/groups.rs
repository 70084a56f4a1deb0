//! Rule-set group store backed by a JSON file.
//!
//! The on-disk document is a flat `name → [rule-set, ...]` object, UTF-8,
//! pretty-printed, key order preserved. Entries whose value is not a list
//! are dropped on load; list items that are not strings are coerced. Every
//! mutation is a read-modify-write on the whole collection under one write
//! lock, then a whole-document save.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, StorageError};

/// Named rule-set groups, shared across identities.
#[derive(Debug)]
pub struct GroupStore {
    path: PathBuf,
    groups: RwLock<IndexMap<String, Vec<String>>>,
}

impl GroupStore {
    /// Opens the store at `path`, loading whatever is currently persisted.
    ///
    /// Load failures of any kind yield an empty store; they are logged, not
    /// surfaced.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let groups = load_file(&path);
        Self {
            path,
            groups: RwLock::new(groups),
        }
    }

    /// Returns the group names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.groups.read().unwrap().keys().cloned().collect()
    }

    /// Returns the number of stored groups.
    pub fn len(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    /// Returns whether the store holds no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.read().unwrap().is_empty()
    }

    /// Returns the member rule-sets of one group.
    pub fn members(&self, name: &str) -> Option<Vec<String>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Returns all groups in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, Vec<String>> {
        self.groups.read().unwrap().clone()
    }

    /// Creates a new group. Fails if the name is already taken.
    pub fn create(&self, name: &str, rules: Vec<String>) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(name) {
            return Err(StorageError::GroupExists(name.to_string()));
        }
        groups.insert(name.to_string(), dedup(rules));
        self.persist(&groups)
    }

    /// Adds rule-sets to a group, creating the group if missing.
    ///
    /// Duplicates are suppressed; existing members keep their position.
    pub fn add_rules(&self, name: &str, rules: &[String]) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        let members = groups.entry(name.to_string()).or_default();
        for rule in rules {
            if !members.contains(rule) {
                members.push(rule.clone());
            }
        }
        self.persist(&groups)
    }

    /// Removes rule-sets from a group. Fails if the group does not exist.
    pub fn remove_rules(&self, name: &str, rules: &[String]) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        let members = groups
            .get_mut(name)
            .ok_or_else(|| StorageError::GroupNotFound(name.to_string()))?;
        members.retain(|m| !rules.contains(m));
        self.persist(&groups)
    }

    /// Replaces a group's member list wholesale, creating it if missing.
    pub fn replace(&self, name: &str, rules: Vec<String>) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        groups.insert(name.to_string(), dedup(rules));
        self.persist(&groups)
    }

    /// Removes a whole group. Fails if it does not exist.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut groups = self.groups.write().unwrap();
        if groups.shift_remove(name).is_none() {
            return Err(StorageError::GroupNotFound(name.to_string()));
        }
        self.persist(&groups)
    }

    /// Writes the whole mapping to disk.
    ///
    /// On failure the in-memory mutation stays applied, so the caller can
    /// retry the save.
    fn persist(&self, groups: &IndexMap<String, Vec<String>>) -> Result<()> {
        let body = serde_json::to_string_pretty(groups)?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

fn dedup(rules: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        if !out.contains(&rule) {
            out.push(rule);
        }
    }
    out
}

fn load_file(path: &Path) -> IndexMap<String, Vec<String>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to read group store, starting empty");
            }
            return IndexMap::new();
        }
    };
    match parse_groups(&data) {
        Ok(groups) => groups,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed group store, starting empty");
            IndexMap::new()
        }
    }
}

fn parse_groups(data: &str) -> serde_json::Result<IndexMap<String, Vec<String>>> {
    // Deserializing straight into an IndexMap keeps document key order.
    let raw: IndexMap<String, Value> = serde_json::from_str(data)?;
    let mut groups = IndexMap::with_capacity(raw.len());
    for (name, entry) in raw {
        if let Value::Array(items) = entry {
            let rules = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            groups.insert(name, rules);
        }
    }
    Ok(groups)
}
