//! # Configuration Loader
//!
//! Runs the full pipeline once: order sources by precedence, merge them,
//! decode the result and validate it.
//!
//! # Precedence Order
//! 1. Built-in defaults
//! 2. Every caller-supplied source that is neither environment nor CLI,
//!    in call order (caller-supplied defaults included)
//! 3. The process environment, unless the loader was built without it
//! 4. Caller-supplied environment sources, in call order
//! 5. CLI sources, in call order
//!
//! Provenance from the last successful run is kept for diagnostics.

use crate::config::Config;
use crate::decode::decode;
use crate::error::ConfigError;
use crate::precedence::KeySpace;
use crate::source::{DefaultSource, EnvSource, Source, SourceType};
use crate::validation;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Provenance of the most recent successful load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Key path to the source that last wrote it
    pub sources: BTreeMap<String, SourceType>,

    /// When the snapshot was produced
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Pipeline plus the provenance of the last good run.
#[derive(Debug)]
pub struct ConfigLoader {
    metadata: RwLock<Metadata>,
    environment: Option<EnvSource>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader that reads the live process environment on every load.
    pub fn new() -> Self {
        Self::with_environment(Some(EnvSource::new()))
    }

    /// Loader with an explicit environment tier.
    ///
    /// `None` skips the environment tier entirely; a fixed
    /// [`EnvSource::from_vars`] makes loads independent of the process.
    pub fn with_environment(environment: Option<EnvSource>) -> Self {
        Self {
            metadata: RwLock::new(Metadata::default()),
            environment,
        }
    }

    /// Loads, decodes and validates configuration from `sources`.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Produces one validated snapshot. Nothing is recorded unless every
    /// step succeeds.
    ///
    /// ## Usage
    /// ```rust
    /// use strata_config::{CliSource, ConfigLoader, Source, SourceType};
    /// use std::sync::Arc;
    ///
    /// let loader = ConfigLoader::with_environment(None);
    /// let sources: Vec<Arc<dyn Source>> = vec![Arc::new(CliSource::new([("port", "6001")]))];
    /// let config = loader.load(&sources).unwrap();
    /// assert_eq!(config.server.port, 6001);
    /// assert_eq!(loader.source_of("server.port"), SourceType::Cli);
    /// ```
    ///
    /// ## Error Handling
    /// - `SourceRead`: a source failed to load
    /// - `MergeConflict`: map/scalar shape mismatch between sources
    /// - `Decode`: one or more values could not be coerced
    /// - `Validation` / `CrossField`: the decoded snapshot is invalid
    pub fn load(&self, sources: &[Arc<dyn Source>]) -> Result<Config, ConfigError> {
        let mut space = KeySpace::new();
        let defaults = DefaultSource::new();
        space.apply(&defaults.load()?, SourceType::Default, "default")?;

        let (others, env, cli) = partition(sources);
        for source in others {
            space.apply(&source.load()?, source.source_type(), &source.describe())?;
        }
        if let Some(environment) = &self.environment {
            space.apply(&environment.load()?, SourceType::Env, "process environment")?;
        }
        for source in env.into_iter().chain(cli) {
            space.apply(&source.load()?, source.source_type(), &source.describe())?;
        }

        let (tree, provenance) = space.into_parts();
        let config = decode(&tree)?;
        validation::validate(&config)?;

        info!(
            sources = sources.len(),
            keys = provenance.len(),
            "Configuration loaded"
        );

        let mut metadata = self.metadata.write();
        metadata.sources = provenance;
        metadata.loaded_at = Some(Utc::now());
        Ok(config)
    }

    /// Source that last set `key_path`, or [`SourceType::Default`] when the
    /// key is not tracked.
    pub fn source_of(&self, key_path: &str) -> SourceType {
        self.metadata
            .read()
            .sources
            .get(key_path)
            .copied()
            .unwrap_or(SourceType::Default)
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata.read().clone()
    }

    /// Runs structural and cross-field validation on any snapshot.
    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        validation::validate(config)
    }
}

type Tier<'a> = Vec<&'a Arc<dyn Source>>;

/// Splits caller sources into the non-env/non-CLI, env and CLI tiers,
/// keeping call order inside each tier.
fn partition(sources: &[Arc<dyn Source>]) -> (Tier<'_>, Tier<'_>, Tier<'_>) {
    let mut others = Vec::new();
    let mut env = Vec::new();
    let mut cli = Vec::new();
    for source in sources {
        match source.source_type() {
            SourceType::Default | SourceType::File => others.push(source),
            SourceType::Env => env.push(source),
            SourceType::Cli => cli.push(source),
        }
    }
    debug!(
        others = others.len(),
        env = env.len(),
        cli = cli.len(),
        "Ordered configuration sources"
    );
    (others, env, cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_loader::FileSource;
    use crate::source::{CliSource, KeyMap};
    use async_trait::async_trait;
    use serde_json::json;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn arc<S: Source + 'static>(source: S) -> Arc<dyn Source> {
        Arc::new(source)
    }

    /// Loader that never reads the process environment.
    fn isolated() -> ConfigLoader {
        ConfigLoader::with_environment(None)
    }

    /// Caller-supplied defaults, e.g. an embedding application's baseline.
    struct AppDefaults(KeyMap);

    #[async_trait]
    impl Source for AppDefaults {
        fn load(&self) -> Result<KeyMap, ConfigError> {
            Ok(self.0.clone())
        }

        fn source_type(&self) -> SourceType {
            SourceType::Default
        }
    }

    fn app_defaults(value: serde_json::Value) -> Arc<dyn Source> {
        match value {
            serde_json::Value::Object(map) => arc(AppDefaults(map)),
            other => panic!("not a map: {other}"),
        }
    }

    #[test]
    fn test_defaults_only() {
        let loader = isolated();
        let config = loader.load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(loader.source_of("server.port"), SourceType::Default);
        assert!(loader.metadata().loaded_at.is_some());
    }

    #[test]
    fn test_precedence_default_file_cli() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  port: 9090\n").unwrap();

        let loader = isolated();
        let file_only = loader.load(&[arc(FileSource::new(&path))]).unwrap();
        assert_eq!(file_only.server.port, 9090);
        assert_eq!(loader.source_of("server.port"), SourceType::File);

        // CLI passed first still applies last.
        let config = loader
            .load(&[arc(CliSource::new([("port", json!(6001))])), arc(FileSource::new(&path))])
            .unwrap();
        assert_eq!(config.server.port, 6001);
        assert_eq!(loader.source_of("server.port"), SourceType::Cli);
    }

    #[test]
    fn test_env_overrides_file_regardless_of_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  port: 9090\n  timeout: 10s\n").unwrap();

        let loader = isolated();
        let config = loader
            .load(&[
                arc(EnvSource::from_vars([("SERVER_PORT", "7070")])),
                arc(FileSource::new(&path)),
            ])
            .unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.timeout, std::time::Duration::from_secs(10));
        assert_eq!(loader.source_of("server.port"), SourceType::Env);
        assert_eq!(loader.source_of("server.timeout"), SourceType::File);
    }

    #[test]
    fn test_absent_key_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  port: 9090\n").unwrap();

        let loader = isolated();
        let config = loader
            .load(&[
                arc(FileSource::new(&path)),
                arc(EnvSource::from_vars([("SERVER_HOST", "env.example.com")])),
            ])
            .unwrap();
        assert_eq!(config.server.host, "env.example.com");
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_failure_keeps_previous_provenance() {
        let loader = isolated();
        loader
            .load(&[arc(CliSource::new([("port", json!(6001))]))])
            .unwrap();
        let before = loader.metadata();

        let error = loader
            .load(&[arc(CliSource::new([("port", json!(99999))]))])
            .unwrap_err();
        assert!(matches!(error, ConfigError::Validation { .. }));
        assert_eq!(loader.metadata(), before);
        assert_eq!(loader.source_of("server.port"), SourceType::Cli);
    }

    #[test]
    fn test_merge_conflict_aborts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  cors: disabled\n").unwrap();

        let error = isolated()
            .load(&[arc(FileSource::new(&path))])
            .unwrap_err();
        match error {
            ConfigError::MergeConflict { key_path, .. } => assert_eq!(key_path, "server.cors"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_untracked_key_reports_default() {
        let loader = isolated();
        assert_eq!(loader.source_of("no.such.key"), SourceType::Default);
    }

    #[test]
    fn test_caller_defaults_apply_before_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  host: file.example.com\n").unwrap();

        let loader = isolated();
        let config = loader
            .load(&[
                arc(FileSource::new(&path)),
                app_defaults(json!({"server": {"port": 7777, "host": "app.example.com"}})),
            ])
            .unwrap();
        assert_eq!(config.server.port, 7777);
        assert_eq!(loader.source_of("server.port"), SourceType::Default);
        // Caller defaults keep call order inside their tier.
        assert_eq!(config.server.host, "app.example.com");

        let config = loader
            .load(&[
                app_defaults(json!({"server": {"port": 7777, "host": "app.example.com"}})),
                arc(FileSource::new(&path)),
            ])
            .unwrap();
        assert_eq!(config.server.host, "file.example.com");
        assert_eq!(loader.source_of("server.host"), SourceType::File);
    }

    #[test]
    fn test_empty_map_over_scalar_in_file_conflicts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "server:\n  port: {}\n").unwrap();

        let error = isolated()
            .load(&[arc(FileSource::new(&path))])
            .unwrap_err();
        match error {
            ConfigError::MergeConflict { key_path, .. } => assert_eq!(key_path, "server.port"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[serial]
    fn test_process_environment_applies_without_env_source() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { env::set_var("REDIS_DB", "7") };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "redis:\n  db: 3\n").unwrap();

        let loader = ConfigLoader::new();
        let result = loader.load(&[arc(FileSource::new(&path))]);
        let isolated_result = isolated().load(&[arc(FileSource::new(&path))]);
        unsafe { env::remove_var("REDIS_DB") };

        assert_eq!(result.unwrap().redis.db, 7);
        assert_eq!(loader.source_of("redis.db"), SourceType::Env);
        assert_eq!(isolated_result.unwrap().redis.db, 3);
    }

    #[test]
    #[serial]
    fn test_caller_env_source_layers_over_process_environment() {
        unsafe { env::set_var("REDIS_DB", "7") };
        let result = ConfigLoader::new().load(&[arc(EnvSource::from_vars([("REDIS_DB", "9")]))]);
        unsafe { env::remove_var("REDIS_DB") };

        assert_eq!(result.unwrap().redis.db, 9);
    }
}
