//! # Configuration Precedence
//!
//! Folds source key maps into one hierarchical key space and records which
//! source last wrote each key.
//!
//! # Precedence Order
//! 1. CLI overrides (highest priority)
//! 2. Environment variables
//! 3. Caller-supplied sources such as files, in call order
//! 4. Built-in defaults (lowest priority)
//!
//! Ordering is decided by the loader; this module only applies one source
//! at a time on top of what is already there.

use crate::error::ConfigError;
use crate::registry::registry;
use crate::source::{KeyMap, SourceType};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Flattens nested maps into dot-delimited key paths.
///
/// Arrays are leaves. Nulls and empty maps carry no value and are skipped,
/// so they never overwrite anything already merged.
pub fn flatten(map: &KeyMap) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", map, &mut out);
    out
}

fn flatten_into(prefix: &str, map: &KeyMap, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Null => {}
            Value::Object(inner) => flatten_into(&path, inner, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn shape(value: &Value) -> &'static str {
    if value.is_object() { "map" } else { "scalar" }
}

/// Writes `value` at `key_path`, creating intermediate maps as needed.
///
/// Fails with [`ConfigError::MergeConflict`] when a map would replace a
/// scalar or a scalar would replace a map.
pub fn insert_path(map: &mut KeyMap, key_path: &str, value: Value) -> Result<(), ConfigError> {
    let mut current = map;
    let mut segments = key_path.split('.').filter(|s| !s.is_empty()).peekable();
    let mut walked = String::new();

    while let Some(segment) = segments.next() {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        if segments.peek().is_none() {
            if let Some(existing) = current.get(segment) {
                if existing.is_object() != value.is_object() {
                    return Err(ConfigError::MergeConflict {
                        key_path: walked,
                        existing: shape(existing),
                        incoming: shape(&value),
                    });
                }
            }
            current.insert(segment.to_string(), value);
            return Ok(());
        }

        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(KeyMap::new()));
        match entry {
            Value::Object(inner) => current = inner,
            other => {
                return Err(ConfigError::MergeConflict {
                    key_path: walked,
                    existing: shape(other),
                    incoming: "map",
                });
            }
        }
    }
    Ok(())
}

/// Rejects incoming maps, empty ones included, that land on a scalar.
///
/// Flattening drops empty maps, so this runs on the nested form before
/// anything is written.
fn check_map_shapes(existing: &KeyMap, incoming: &KeyMap, prefix: &str) -> Result<(), ConfigError> {
    for (key, value) in incoming {
        let Value::Object(inner) = value else {
            continue;
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match existing.get(key) {
            Some(Value::Object(current)) => check_map_shapes(current, inner, &path)?,
            Some(Value::Null) | None => {}
            Some(current) => {
                return Err(ConfigError::MergeConflict {
                    key_path: path,
                    existing: shape(current),
                    incoming: "map",
                });
            }
        }
    }
    Ok(())
}

/// Reads the value at `key_path`.
pub fn lookup<'a>(map: &'a KeyMap, key_path: &str) -> Option<&'a Value> {
    let (parent, leaf) = match key_path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, key_path),
    };
    let mut current = map;
    if let Some(parent) = parent {
        for segment in parent.split('.') {
            current = current.get(segment)?.as_object()?;
        }
    }
    current.get(leaf)
}

/// Merged key space plus provenance, built fresh for every load.
#[derive(Debug, Default, Clone)]
pub struct KeySpace {
    tree: KeyMap,
    provenance: BTreeMap<String, SourceType>,
}

impl KeySpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one source on top of the current key space.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Overlays `data` key by key and stamps provenance for every key the
    /// source wrote and every key whose value differs from before the step.
    ///
    /// ## Returns
    /// The key paths stamped with `origin`, sorted.
    ///
    /// ## Logging
    /// Changed values are logged at debug level; sensitive keys are shown
    /// as `***`.
    pub fn apply(
        &mut self,
        data: &KeyMap,
        origin: SourceType,
        label: &str,
    ) -> Result<Vec<String>, ConfigError> {
        check_map_shapes(&self.tree, data, "")?;
        let before = flatten(&self.tree);
        let incoming = flatten(data);

        for (key_path, value) in &incoming {
            insert_path(&mut self.tree, key_path, value.clone())?;
        }

        let after = flatten(&self.tree);
        let mut touched: BTreeSet<&String> = incoming.keys().collect();
        touched.extend(
            after
                .iter()
                .filter(|(key, value)| before.get(*key) != Some(*value))
                .map(|(key, _)| key),
        );

        let registry = registry();
        let mut changes = Vec::new();
        for key_path in &touched {
            if before.get(*key_path) != after.get(*key_path) {
                if registry.is_sensitive(key_path) {
                    changes.push(format!("{key_path} = ***"));
                } else if let Some(value) = after.get(*key_path) {
                    changes.push(format!("{key_path} = {value}"));
                }
            }
            self.provenance.insert((*key_path).clone(), origin);
        }

        if !changes.is_empty() {
            tracing::debug!("Configuration from {}: {:?}", label, changes);
        }

        Ok(touched.into_iter().cloned().collect())
    }

    pub fn tree(&self) -> &KeyMap {
        &self.tree
    }

    pub fn provenance(&self) -> &BTreeMap<String, SourceType> {
        &self.provenance
    }

    pub fn into_parts(self) -> (KeyMap, BTreeMap<String, SourceType>) {
        (self.tree, self.provenance)
    }
}
