//! # Configuration Engine
//!
//! Layered configuration for strata services.
//!
//! This crate provides:
//! - Sources for built-in defaults, YAML/TOML files, environment variables
//!   and CLI overrides
//! - Precedence merging (defaults < files < env < CLI) with per-key provenance
//! - Typed decoding with weak-typing rules and aggregated errors
//! - Structural and cross-field validation
//! - Lock-free snapshot reads with debounced hot reload
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_config::{CliSource, ConfigManager, FileSource, Source};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), strata_config::ConfigError> {
//! // The process environment applies between the file and the overrides.
//! let manager = ConfigManager::new();
//! let sources: Vec<Arc<dyn Source>> = vec![
//!     Arc::new(FileSource::new("strata.yaml")),
//!     Arc::new(CliSource::new([("port", "6001")])),
//! ];
//! manager.load(sources).await?;
//! let config = manager.get().expect("loaded");
//! println!("mode = {}", config.mode);
//! manager.close().await
//! # }
//! ```

pub mod config;
pub mod context;
pub mod decode;
pub mod duration;
pub mod error;
pub mod file_loader;
pub mod hot_reload;
pub mod loader;
pub mod manager;
pub mod precedence;
pub mod registry;
pub mod sensitive;
pub mod source;
pub mod store;
pub mod validation;

pub use config::{
    AuthConfig, CacheConfig, Config, CorsConfig, DatabaseConfig, LimitsConfig, LlmConfig,
    McpProxyConfig, RedisConfig, RuntimeConfig, ServerConfig,
};
pub use error::{ConfigError, FieldError};
pub use file_loader::{FileFormat, FileSource};
pub use hot_reload::FileWatcher;
pub use loader::{ConfigLoader, Metadata};
pub use manager::{
    ConfigCallback, ConfigManager, DEFAULT_DEBOUNCE, LifecycleState, ManagerOptions,
    ProvenanceEntry,
};
pub use registry::{FieldDescriptor, FieldKind, registry};
pub use sensitive::{REDACTION_MARKER, SensitiveString};
pub use source::{ChangeCallback, CliSource, DefaultSource, EnvSource, KeyMap, Source, SourceType};
pub use store::SnapshotStore;
pub use validator::Validate;
