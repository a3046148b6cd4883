//! # Configuration Structures
//!
//! Typed snapshot produced by the decode pipeline.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for field-level constraints
//! - Carry secrets as [`SensitiveString`] so serialized output is redacted
//!
//! Defaults here must agree with the descriptor table in
//! [`crate::registry`]; a unit test enforces it.

use crate::duration::serde_duration;
use crate::sensitive::SensitiveString;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::Duration;
use validator::{Validate, ValidationError};

static WORKFLOW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("valid regex"));

/// Top-level configuration snapshot.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// One immutable, fully decoded configuration instance. Snapshots are never
/// mutated after the pipeline produces them; a reload builds a new one.
///
/// ## Usage
/// ```rust
/// use strata_config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.server.port, 5001);
/// ```
///
/// ## Validation
/// Every section validates its own fields; cross-field rules live in
/// [`crate::validation`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Deployment mode
    #[validate(custom(function = "validate_mode"))]
    pub mode: String,

    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub redis: RedisConfig,

    #[validate(nested)]
    pub runtime: RuntimeConfig,

    #[validate(nested)]
    pub limits: LimitsConfig,

    #[validate(nested)]
    pub llm: LlmConfig,

    #[validate(nested)]
    pub cache: CacheConfig,

    #[validate(nested)]
    pub mcp_proxy: McpProxyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: "memory".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            runtime: RuntimeConfig::default(),
            limits: LimitsConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            mcp_proxy: McpProxyConfig::default(),
        }
    }
}

/// HTTP server configuration.
///
/// ## Fields
/// - `host`: bind address (default: "0.0.0.0")
/// - `port`: listen port, 1-65535 (default: 5001)
/// - `timeout`: request timeout (default: 30s)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Kept signed and range-checked so out-of-range values surface as
    /// validation errors instead of decode failures.
    #[validate(range(min = 1, max = 65535))]
    pub port: i64,

    pub cors_enabled: bool,

    #[validate(nested)]
    pub cors: CorsConfig,

    #[serde(with = "serde_duration")]
    pub timeout: Duration,

    #[validate(nested)]
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            cors_enabled: true,
            cors: CorsConfig::default(),
            timeout: Duration::from_secs(30),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,

    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds
    #[validate(range(min = 0, max = 604_800))]
    pub max_age: i64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
            allow_credentials: true,
            max_age: 86400,
        }
    }
}

/// API authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,

    /// Required when `enabled` is true.
    pub admin_key: SensitiveString,

    /// Workflow ids that bypass authentication
    #[validate(custom(function = "validate_workflow_ids"))]
    pub workflow_exceptions: Vec<String>,
}

/// Database configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Selects the persistence driver and its connection parameters.
///
/// ## Fields
/// - `driver`: "postgres" or "sqlite" (default: "postgres")
/// - `conn_string`: full DSN; when set, discrete fields are not required
/// - `host`, `port`, `user`, `name`: discrete PostgreSQL parameters
/// - `password`: redacted in all textual output
/// - `ssl_mode`: PostgreSQL SSL mode (default: "disable")
/// - `path`: database file, required for sqlite
/// - `migration_timeout`: must be at least 45s for postgres (default: 2m)
///
/// ## Validation
/// `port` stays textual so it can carry whatever the environment supplies;
/// it is range-checked as a port during cross-field validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(custom(function = "validate_driver"))]
    pub driver: String,

    pub conn_string: String,

    pub host: String,

    pub port: String,

    pub user: String,

    pub password: SensitiveString,

    pub name: String,

    #[validate(custom(function = "validate_ssl_mode"))]
    pub ssl_mode: String,

    pub path: String,

    #[serde(with = "serde_duration")]
    pub migration_timeout: Duration,

    #[validate(range(min = 1, max = 1000))]
    pub max_open_conns: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "postgres".to_string(),
            conn_string: String::new(),
            host: "localhost".to_string(),
            port: "5432".to_string(),
            user: "postgres".to_string(),
            password: SensitiveString::default(),
            name: "strata".to_string(),
            ssl_mode: "disable".to_string(),
            path: String::new(),
            migration_timeout: Duration::from_secs(120),
            max_open_conns: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,

    pub host: String,

    pub port: String,

    pub password: SensitiveString,

    #[validate(range(min = 0, max = 15))]
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            host: "localhost".to_string(),
            port: "6379".to_string(),
            password: SensitiveString::default(),
            db: 0,
        }
    }
}

/// Runtime behaviour of the worker process.
///
/// ## Fields
/// - `dispatcher_heartbeat_interval` < `dispatcher_heartbeat_ttl` <
///   `dispatcher_stale_threshold` (defaults: 30s, 90s, 120s)
/// - `task_execution_timeout_default` <= `task_execution_timeout_max`
///   (defaults: 60s, 300s)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    #[validate(custom(function = "validate_environment"))]
    pub environment: String,

    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    #[serde(with = "serde_duration")]
    pub dispatcher_heartbeat_interval: Duration,

    #[serde(with = "serde_duration")]
    pub dispatcher_heartbeat_ttl: Duration,

    #[serde(with = "serde_duration")]
    pub dispatcher_stale_threshold: Duration,

    #[serde(with = "serde_duration")]
    pub task_execution_timeout_default: Duration,

    #[serde(with = "serde_duration")]
    pub task_execution_timeout_max: Duration,

    #[serde(with = "serde_duration")]
    pub tool_execution_timeout: Duration,

    pub bun_permissions: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            dispatcher_heartbeat_interval: Duration::from_secs(30),
            dispatcher_heartbeat_ttl: Duration::from_secs(90),
            dispatcher_stale_threshold: Duration::from_secs(120),
            task_execution_timeout_default: Duration::from_secs(60),
            task_execution_timeout_max: Duration::from_secs(300),
            tool_execution_timeout: Duration::from_secs(60),
            bun_permissions: vec!["--allow-read".to_string()],
        }
    }
}

/// Payload size limits.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    #[validate(range(min = 1, max = 1000))]
    pub max_nesting_depth: u64,

    #[validate(range(min = 1))]
    pub max_string_length: u64,

    #[validate(range(min = 1))]
    pub max_message_content: u64,

    #[validate(range(min = 1))]
    pub max_total_content_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 20,
            max_string_length: 10_485_760,
            max_message_content: 10_240,
            max_total_content_size: 102_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    #[validate(length(min = 1))]
    pub provider: String,

    pub api_key: SensitiveString,

    #[validate(range(min = 1, max = 100))]
    pub max_tool_calls: u64,

    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: SensitiveString::default(),
            max_tool_calls: 10,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    #[serde(with = "serde_duration")]
    pub ttl: Duration,

    #[validate(range(min = 1, max = 100_000))]
    pub key_scan_count: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(86_400),
            key_scan_count: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct McpProxyConfig {
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: i64,
}

impl Default for McpProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6001,
        }
    }
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

fn validate_mode(value: &str) -> Result<(), ValidationError> {
    match value.trim() {
        "memory" | "persistent" | "distributed" => Ok(()),
        "standalone" => Err(invalid(
            "deprecated_mode",
            "mode \"standalone\" has been replaced by \"memory\" (ephemeral) and \"persistent\"".to_string(),
        )),
        other => Err(invalid(
            "invalid_mode",
            format!("must be one of [memory persistent distributed], got {other:?}"),
        )),
    }
}

fn validate_driver(value: &str) -> Result<(), ValidationError> {
    match value {
        "postgres" | "sqlite" => Ok(()),
        other => Err(invalid(
            "invalid_driver",
            format!("unsupported database driver: {other:?}"),
        )),
    }
}

fn validate_ssl_mode(value: &str) -> Result<(), ValidationError> {
    match value {
        "disable" | "allow" | "prefer" | "require" | "verify-ca" | "verify-full" => Ok(()),
        other => Err(invalid(
            "invalid_ssl_mode",
            format!("must be one of [disable allow prefer require verify-ca verify-full], got {other:?}"),
        )),
    }
}

fn validate_environment(value: &str) -> Result<(), ValidationError> {
    match value {
        "development" | "staging" | "production" => Ok(()),
        other => Err(invalid(
            "invalid_environment",
            format!("must be one of [development staging production], got {other:?}"),
        )),
    }
}

fn validate_log_level(value: &str) -> Result<(), ValidationError> {
    match value {
        "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(invalid(
            "invalid_log_level",
            format!("must be one of [debug info warn error], got {other:?}"),
        )),
    }
}

fn validate_workflow_ids(ids: &[String]) -> Result<(), ValidationError> {
    let rejected: Vec<&str> = ids
        .iter()
        .filter(|id| !WORKFLOW_ID.is_match(id))
        .map(String::as_str)
        .collect();
    if rejected.is_empty() {
        Ok(())
    } else {
        Err(invalid(
            "invalid_workflow_id",
            format!("invalid workflow ids {rejected:?}"),
        ))
    }
}
