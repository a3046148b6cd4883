//! # Configuration File Loading
//!
//! File-backed configuration source for YAML or TOML documents.
//!
//! Supports automatic format detection based on file extension.

use crate::error::ConfigError;
use crate::hot_reload::FileWatcher;
use crate::source::{ChangeCallback, KeyMap, Source, SourceType};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Document format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Toml,
}

impl FileFormat {
    /// `.toml` selects TOML; `.yaml`, `.yml` and anything else select YAML.
    pub fn detect(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Configuration file source.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Reads a nested key-value document from disk on every load and observes
/// the file for changes.
///
/// ## Usage
/// ```rust,no_run
/// use strata_config::{FileSource, Source};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = FileSource::new("strata.yaml");
///     let data = source.load()?;
///     println!("top-level keys: {}", data.len());
///     Ok(())
/// }
/// ```
///
/// ## Merge Safety
/// - A missing file loads as an empty map so it cannot clobber values from
///   other sources
/// - Keys set to null are dropped before merge
///
/// ## Error Handling
/// Returns `ConfigError::SourceRead` for unreadable files, syntax errors
/// and documents whose top level is not a map.
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
    watcher: FileWatcher,
    closed: AtomicBool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::detect(&path);
        Self::with_format(path, format)
    }

    pub fn with_format(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        let path = path.into();
        Self {
            watcher: FileWatcher::new(path.clone()),
            path,
            format,
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn read_error(&self, reason: impl std::fmt::Display) -> ConfigError {
        ConfigError::SourceRead {
            source_type: SourceType::File,
            reason: format!("{}: {reason}", self.path.display()),
        }
    }

    fn parse(&self, contents: &str) -> Result<Value, ConfigError> {
        match self.format {
            FileFormat::Yaml => serde_yaml::from_str(contents)
                .map_err(|e| self.read_error(format!("failed to parse YAML: {e}"))),
            FileFormat::Toml => toml::from_str(contents)
                .map_err(|e| self.read_error(format!("failed to parse TOML: {e}"))),
        }
    }
}

#[async_trait]
impl Source for FileSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "Config file not found, contributing no values");
                return Ok(KeyMap::new());
            }
            Err(e) => return Err(self.read_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(KeyMap::new());
        }

        match self.parse(&contents)? {
            Value::Object(mut map) => {
                strip_nulls(&mut map);
                Ok(map)
            }
            Value::Null => Ok(KeyMap::new()),
            _ => Err(self.read_error("top-level value must be a map")),
        }
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn watch(
        &self,
        cancel: CancellationToken,
        on_change: ChangeCallback,
    ) -> Result<(), ConfigError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConfigError::Closed);
        }
        self.watcher.register(cancel, on_change).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), ConfigError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.watcher.close().await;
        Ok(())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) && self.watcher.active_registrations() > 0 {
            warn!(path = ?self.path, "File source dropped without close");
        }
    }
}

fn strip_nulls(map: &mut KeyMap) {
    map.retain(|_, value| !value.is_null());
    for value in map.values_mut() {
        if let Value::Object(inner) = value {
            strip_nulls(inner);
        }
    }
}
