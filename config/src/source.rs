//! # Configuration Sources
//!
//! Uniform contract over every configuration origin, plus the adapters that
//! do not touch the filesystem: built-in defaults, process environment and
//! CLI overrides. The file-backed adapter lives in [`crate::file_loader`].

use crate::error::ConfigError;
use crate::precedence::insert_path;
use crate::registry::registry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Nested key-value map returned by [`Source::load`].
pub type KeyMap = serde_json::Map<String, Value>;

/// Callback invoked by a watching source when its origin changes.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Origin identifier recorded in provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Default,
    File,
    Env,
    Cli,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::File => "file",
            Self::Env => "env",
            Self::Cli => "cli",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configuration origin.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Lets the merge engine treat defaults, files, environment and CLI flags
/// the same way.
///
/// ## Contract
/// - `load` is side-effect free and may be called on every reload
/// - `watch` registers interest in external changes and returns
///   immediately; the registration lives until `cancel` fires. Sources that
///   cannot observe changes keep the default no-op
/// - `close` releases watcher and file handles and is idempotent
#[async_trait]
pub trait Source: Send + Sync {
    fn load(&self) -> Result<KeyMap, ConfigError>;

    fn source_type(&self) -> SourceType;

    /// Human-readable label for logs.
    fn describe(&self) -> String {
        self.source_type().to_string()
    }

    async fn watch(
        &self,
        _cancel: CancellationToken,
        _on_change: ChangeCallback,
    ) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Built-in defaults from the descriptor table.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSource;

impl DefaultSource {
    pub fn new() -> Self {
        Self
    }
}

impl Source for DefaultSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let mut data = KeyMap::new();
        for descriptor in registry().fields() {
            insert_path(&mut data, descriptor.key_path, descriptor.default.to_value())?;
        }
        Ok(data)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Default
    }
}

/// Maps an environment variable name to a key path using the generic rule:
/// lowercase, split on `_`, first token is the section, the remaining tokens
/// rejoined with `_` are the field name.
///
/// Repeated, leading and trailing separators are collapsed. Names with fewer
/// than two tokens have no key path.
///
/// ```rust
/// use strata_config::source::transform_env_key;
///
/// assert_eq!(
///     transform_env_key("LIMITS_MAX_NESTING_DEPTH").as_deref(),
///     Some("limits.max_nesting_depth")
/// );
/// assert_eq!(transform_env_key("_CACHE__TTL_").as_deref(), Some("cache.ttl"));
/// assert_eq!(transform_env_key("HOME"), None);
/// ```
pub fn transform_env_key(name: &str) -> Option<String> {
    let lowered = name.to_lowercase();
    let mut tokens = lowered.split('_').filter(|token| !token.is_empty());
    let section = tokens.next()?;
    let field = tokens.collect::<Vec<_>>().join("_");
    if field.is_empty() {
        return None;
    }
    Some(format!("{section}.{field}"))
}

/// Process environment.
///
/// Variables listed in the descriptor table map to their declared key path.
/// Any other variable goes through [`transform_env_key`] and is kept only
/// when its first token names a known section and the result is not an
/// interior node of the schema.
#[derive(Debug, Default, Clone)]
pub struct EnvSource {
    vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
    /// Reads the live process environment on every load.
    pub fn new() -> Self {
        Self { vars: None }
    }

    /// Uses a fixed variable set instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(name, value)| (name.into(), value.into()))
                    .collect(),
            ),
        }
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars_os()
                .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
        }
    }
}

impl Source for EnvSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let registry = registry();
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        let mut explicit: Vec<(&'static str, String)> = Vec::new();

        for (name, value) in self.snapshot() {
            if let Some(key_path) = registry.path_for_env(&name) {
                explicit.push((key_path, value));
                continue;
            }
            let Some(key_path) = transform_env_key(&name) else {
                continue;
            };
            let section = key_path.split('.').next().unwrap_or_default();
            if registry.is_section(section) && !registry.is_compound(&key_path) {
                resolved.insert(key_path, value);
            }
        }

        // Explicit mappings win over the fallback for the same key path.
        for (key_path, value) in explicit {
            resolved.insert(key_path.to_string(), value);
        }

        let mut data = KeyMap::new();
        for (key_path, value) in resolved {
            insert_path(&mut data, &key_path, Value::String(value))?;
        }
        Ok(data)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Env
    }
}

/// Explicit `flag-name -> value` overrides from the command line.
#[derive(Debug, Default, Clone)]
pub struct CliSource {
    flags: BTreeMap<String, Value>,
}

impl CliSource {
    pub fn new<I, K, V>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            flags: flags
                .into_iter()
                .map(|(flag, value)| (flag.into(), value.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Source for CliSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let registry = registry();
        let mut data = KeyMap::new();
        for (flag, value) in &self.flags {
            match registry.path_for_flag(flag) {
                Some(key_path) => insert_path(&mut data, key_path, value.clone())?,
                None => debug!(flag = %flag, "Ignoring unknown CLI flag"),
            }
        }
        Ok(data)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Cli
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::lookup;
    use serde_json::json;

    #[test]
    fn test_transform_env_key() {
        assert_eq!(
            transform_env_key("LIMITS_MAX_NESTING_DEPTH").as_deref(),
            Some("limits.max_nesting_depth")
        );
        assert_eq!(transform_env_key("__LIMITS___MAX_DEPTH__").as_deref(), Some("limits.max_depth"));
        assert_eq!(transform_env_key("PATH"), None);
        assert_eq!(transform_env_key("___"), None);
        assert_eq!(transform_env_key(""), None);
    }

    #[test]
    fn test_default_source_covers_every_field() {
        let data = DefaultSource::new().load().unwrap();
        for descriptor in registry().fields() {
            assert!(lookup(&data, descriptor.key_path).is_some(), "{}", descriptor.key_path);
        }
        assert_eq!(lookup(&data, "server.port"), Some(&json!(5001)));
    }

    #[test]
    fn test_env_explicit_table() {
        let source = EnvSource::from_vars([
            ("SERVER_PORT", "7070"),
            ("DB_PASSWORD", "hunter2"),
            ("TASK_EXECUTION_TIMEOUT_MAX", "10m"),
        ]);
        let data = source.load().unwrap();
        assert_eq!(lookup(&data, "server.port"), Some(&json!("7070")));
        assert_eq!(lookup(&data, "database.password"), Some(&json!("hunter2")));
        assert_eq!(
            lookup(&data, "runtime.task_execution_timeout_max"),
            Some(&json!("10m"))
        );
    }

    #[test]
    fn test_env_fallback_respects_sections() {
        let source = EnvSource::from_vars([
            ("LIMITS_MAX_NESTING_DEPTH", "50"),
            ("HOME", "/root"),
            ("CARGO_PKG_NAME", "strata"),
            ("SERVER_CORS", "yes"),
            ("MODE_EXTRA", "x"),
        ]);
        let data = source.load().unwrap();
        assert_eq!(lookup(&data, "limits.max_nesting_depth"), Some(&json!("50")));
        assert!(data.get("home").is_none());
        assert!(data.get("cargo").is_none());
        assert!(data.get("server").is_none());
        assert!(data.get("mode").is_none());
    }

    #[test]
    fn test_env_explicit_wins_over_fallback() {
        // SERVER__PORT collapses to server.port through the fallback.
        let source = EnvSource::from_vars([("SERVER_PORT", "2"), ("SERVER__PORT", "1")]);
        let data = source.load().unwrap();
        assert_eq!(lookup(&data, "server.port"), Some(&json!("2")));
    }

    #[test]
    fn test_cli_ignores_unknown_flags() {
        let source = CliSource::new([("port", json!(6001)), ("not-a-flag", json!("x"))]);
        let data = source.load().unwrap();
        assert_eq!(lookup(&data, "server.port"), Some(&json!(6001)));
        assert_eq!(data.len(), 1);
    }

    #[tokio::test]
    async fn test_non_file_sources_watch_is_noop() {
        let token = CancellationToken::new();
        let callback: ChangeCallback = Arc::new(|| panic!("must not be invoked"));
        EnvSource::new()
            .watch(token.clone(), callback.clone())
            .await
            .unwrap();
        CliSource::default().watch(token, callback).await.unwrap();
        DefaultSource::new().close().await.unwrap();
    }
}
