//! # Field Registry
//!
//! Static descriptor table for every leaf configuration field.
//!
//! The table is the single source of truth for defaults, environment
//! variable names, CLI flag names, value kinds and sensitivity. Lookup
//! indexes are built once on first use.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

/// Declared kind of a leaf field; selects the decode function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Unsigned,
    Float,
    Boolean,
    Duration,
    StringList,
    Secret,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Duration => "duration",
            Self::StringList => "string list",
            Self::Secret => "secret",
        }
    }
}

/// Built-in default for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Text form, e.g. `"30s"`.
    Duration(&'static str),
    List(&'static [&'static str]),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            Self::Str(text) | Self::Duration(text) => Value::String(text.to_string()),
            Self::Int(number) => Value::from(number),
            Self::Float(number) => Value::from(number),
            Self::Bool(flag) => Value::Bool(flag),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Value::String((*item).to_string()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub key_path: &'static str,
    pub env_var: Option<&'static str>,
    pub cli_flag: Option<&'static str>,
    pub kind: FieldKind,
    pub sensitive: bool,
    pub default: DefaultValue,
    pub help: &'static str,
}

const fn field(
    key_path: &'static str,
    env_var: Option<&'static str>,
    cli_flag: Option<&'static str>,
    kind: FieldKind,
    default: DefaultValue,
    help: &'static str,
) -> FieldDescriptor {
    FieldDescriptor {
        key_path,
        env_var,
        cli_flag,
        kind,
        sensitive: matches!(kind, FieldKind::Secret),
        default,
        help,
    }
}

use DefaultValue as D;
use FieldKind as K;

static FIELDS: &[FieldDescriptor] = &[
    field("mode", Some("STRATA_MODE"), Some("mode"), K::String, D::Str("memory"), "Deployment mode: memory, persistent or distributed"),
    // server
    field("server.host", Some("SERVER_HOST"), Some("host"), K::String, D::Str("0.0.0.0"), "Address the HTTP server binds to"),
    field("server.port", Some("SERVER_PORT"), Some("port"), K::Integer, D::Int(5001), "Port the HTTP server listens on"),
    field("server.cors_enabled", Some("SERVER_CORS_ENABLED"), Some("cors"), K::Boolean, D::Bool(true), "Enable CORS handling"),
    field("server.cors.allowed_origins", Some("SERVER_CORS_ALLOWED_ORIGINS"), Some("cors-allowed-origins"), K::StringList, D::List(&["http://localhost:3000", "http://localhost:3001"]), "Origins allowed by CORS"),
    field("server.cors.allow_credentials", Some("SERVER_CORS_ALLOW_CREDENTIALS"), Some("cors-allow-credentials"), K::Boolean, D::Bool(true), "Allow credentials on CORS requests"),
    field("server.cors.max_age", Some("SERVER_CORS_MAX_AGE"), Some("cors-max-age"), K::Integer, D::Int(86400), "CORS preflight cache lifetime in seconds"),
    field("server.timeout", Some("SERVER_TIMEOUT"), Some("server-timeout"), K::Duration, D::Duration("30s"), "Request timeout"),
    field("server.auth.enabled", Some("SERVER_AUTH_ENABLED"), Some("auth-enabled"), K::Boolean, D::Bool(false), "Require API key authentication"),
    field("server.auth.admin_key", Some("SERVER_AUTH_ADMIN_KEY"), Some("admin-key"), K::Secret, D::Str(""), "Administrative API key"),
    field("server.auth.workflow_exceptions", Some("SERVER_AUTH_WORKFLOW_EXCEPTIONS"), Some("auth-workflow-exceptions"), K::StringList, D::List(&[]), "Workflow ids exempt from authentication"),
    // database
    field("database.driver", Some("DB_DRIVER"), Some("db-driver"), K::String, D::Str("postgres"), "Database driver: postgres or sqlite"),
    field("database.conn_string", Some("DB_CONN_STRING"), Some("db-conn-string"), K::String, D::Str(""), "Full connection string; overrides discrete fields"),
    field("database.host", Some("DB_HOST"), Some("db-host"), K::String, D::Str("localhost"), "Database host"),
    field("database.port", Some("DB_PORT"), Some("db-port"), K::String, D::Str("5432"), "Database port"),
    field("database.user", Some("DB_USER"), Some("db-user"), K::String, D::Str("postgres"), "Database user"),
    field("database.password", Some("DB_PASSWORD"), Some("db-password"), K::Secret, D::Str(""), "Database password"),
    field("database.name", Some("DB_NAME"), Some("db-name"), K::String, D::Str("strata"), "Database name"),
    field("database.ssl_mode", Some("DB_SSL_MODE"), Some("db-ssl-mode"), K::String, D::Str("disable"), "PostgreSQL SSL mode"),
    field("database.path", Some("DB_PATH"), Some("db-path"), K::String, D::Str(""), "SQLite database file path"),
    field("database.migration_timeout", Some("DB_MIGRATION_TIMEOUT"), Some("db-migration-timeout"), K::Duration, D::Duration("2m"), "Upper bound for schema migrations"),
    field("database.max_open_conns", Some("DB_MAX_OPEN_CONNS"), Some("db-max-open-conns"), K::Integer, D::Int(25), "Maximum open database connections"),
    // redis
    field("redis.url", Some("REDIS_URL"), Some("redis-url"), K::String, D::Str(""), "Redis URL; overrides host and port"),
    field("redis.host", Some("REDIS_HOST"), Some("redis-host"), K::String, D::Str("localhost"), "Redis host"),
    field("redis.port", Some("REDIS_PORT"), Some("redis-port"), K::String, D::Str("6379"), "Redis port"),
    field("redis.password", Some("REDIS_PASSWORD"), Some("redis-password"), K::Secret, D::Str(""), "Redis password"),
    field("redis.db", Some("REDIS_DB"), Some("redis-db"), K::Integer, D::Int(0), "Redis database index"),
    // runtime
    field("runtime.environment", Some("RUNTIME_ENVIRONMENT"), Some("environment"), K::String, D::Str("development"), "Runtime environment: development, staging or production"),
    field("runtime.log_level", Some("RUNTIME_LOG_LEVEL"), Some("runtime-log-level"), K::String, D::Str("info"), "Application log level"),
    field("runtime.dispatcher_heartbeat_interval", Some("RUNTIME_DISPATCHER_HEARTBEAT_INTERVAL"), Some("dispatcher-heartbeat-interval"), K::Duration, D::Duration("30s"), "Interval between dispatcher heartbeats"),
    field("runtime.dispatcher_heartbeat_ttl", Some("RUNTIME_DISPATCHER_HEARTBEAT_TTL"), Some("dispatcher-heartbeat-ttl"), K::Duration, D::Duration("90s"), "Lifetime of a dispatcher heartbeat"),
    field("runtime.dispatcher_stale_threshold", Some("RUNTIME_DISPATCHER_STALE_THRESHOLD"), Some("dispatcher-stale-threshold"), K::Duration, D::Duration("120s"), "Age after which a dispatcher is considered stale"),
    field("runtime.task_execution_timeout_default", Some("TASK_EXECUTION_TIMEOUT_DEFAULT"), Some("task-execution-timeout-default"), K::Duration, D::Duration("60s"), "Default task execution timeout"),
    field("runtime.task_execution_timeout_max", Some("TASK_EXECUTION_TIMEOUT_MAX"), Some("task-execution-timeout-max"), K::Duration, D::Duration("300s"), "Maximum task execution timeout"),
    field("runtime.tool_execution_timeout", Some("TOOL_EXECUTION_TIMEOUT"), Some("tool-execution-timeout"), K::Duration, D::Duration("60s"), "Tool execution timeout"),
    field("runtime.bun_permissions", Some("RUNTIME_BUN_PERMISSIONS"), Some("bun-permissions"), K::StringList, D::List(&["--allow-read"]), "Permissions granted to the tool runtime"),
    // limits: environment names come from the fallback transform
    field("limits.max_nesting_depth", None, None, K::Unsigned, D::Int(20), "Maximum nesting depth of payloads"),
    field("limits.max_string_length", None, None, K::Unsigned, D::Int(10_485_760), "Maximum length of a single string value"),
    field("limits.max_message_content", None, None, K::Unsigned, D::Int(10_240), "Maximum message content length"),
    field("limits.max_total_content_size", None, None, K::Unsigned, D::Int(102_400), "Maximum total content size"),
    // llm
    field("llm.provider", Some("LLM_PROVIDER"), Some("llm-provider"), K::String, D::Str("openai"), "Default LLM provider"),
    field("llm.api_key", Some("LLM_API_KEY"), Some("llm-api-key"), K::Secret, D::Str(""), "API key for the LLM provider"),
    field("llm.max_tool_calls", Some("LLM_MAX_TOOL_CALLS"), Some("llm-max-tool-calls"), K::Unsigned, D::Int(10), "Maximum tool calls per request"),
    field("llm.temperature", Some("LLM_TEMPERATURE"), Some("llm-temperature"), K::Float, D::Float(0.7), "Sampling temperature"),
    // cache
    field("cache.enabled", Some("CACHE_ENABLED"), Some("cache-enabled"), K::Boolean, D::Bool(true), "Enable response caching"),
    field("cache.ttl", Some("CACHE_TTL"), Some("cache-ttl"), K::Duration, D::Duration("24h"), "Cache entry lifetime"),
    field("cache.key_scan_count", Some("CACHE_KEY_SCAN_COUNT"), Some("cache-key-scan-count"), K::Unsigned, D::Int(100), "Keys fetched per cache scan batch"),
    // mcp proxy
    field("mcp_proxy.host", Some("MCP_PROXY_HOST"), Some("mcp-host"), K::String, D::Str("127.0.0.1"), "MCP proxy bind address"),
    field("mcp_proxy.port", Some("MCP_PROXY_PORT"), Some("mcp-port"), K::Integer, D::Int(6001), "MCP proxy port"),
];

/// Indexed view over the descriptor table.
pub struct Registry {
    by_path: HashMap<&'static str, &'static FieldDescriptor>,
    by_env: HashMap<&'static str, &'static str>,
    by_flag: HashMap<&'static str, &'static str>,
    sections: BTreeSet<&'static str>,
    compound: HashSet<&'static str>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::build);

/// Returns the process-wide registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn build() -> Self {
        let mut by_path = HashMap::with_capacity(FIELDS.len());
        let mut by_env = HashMap::new();
        let mut by_flag = HashMap::new();
        let mut sections = BTreeSet::new();
        let mut compound = HashSet::new();

        for descriptor in FIELDS {
            by_path.insert(descriptor.key_path, descriptor);
            if let Some(env_var) = descriptor.env_var {
                by_env.insert(env_var, descriptor.key_path);
            }
            if let Some(flag) = descriptor.cli_flag {
                by_flag.insert(flag, descriptor.key_path);
            }

            let path = descriptor.key_path;
            for (index, _) in path.match_indices('.') {
                compound.insert(&path[..index]);
            }
            if let Some((section, _)) = path.split_once('.') {
                sections.insert(section);
            }
        }

        Self {
            by_path,
            by_env,
            by_flag,
            sections,
            compound,
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    pub fn get(&self, key_path: &str) -> Option<&'static FieldDescriptor> {
        self.by_path.get(key_path).copied()
    }

    /// Key path explicitly mapped to an environment variable.
    pub fn path_for_env(&self, env_var: &str) -> Option<&'static str> {
        self.by_env.get(env_var).copied()
    }

    /// Key path for a CLI flag name.
    pub fn path_for_flag(&self, flag: &str) -> Option<&'static str> {
        self.by_flag.get(flag).copied()
    }

    /// True for top-level names that hold nested fields (`server`, `limits`).
    pub fn is_section(&self, name: &str) -> bool {
        self.sections.contains(name)
    }

    /// True for any interior node of the schema tree.
    pub fn is_compound(&self, key_path: &str) -> bool {
        self.compound.contains(key_path)
    }

    pub fn is_sensitive(&self, key_path: &str) -> bool {
        self.get(key_path).is_some_and(|descriptor| descriptor.sensitive)
    }

    pub fn sections(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_paths_are_unique() {
        let mut seen = HashSet::new();
        for descriptor in FIELDS {
            assert!(seen.insert(descriptor.key_path), "duplicate {}", descriptor.key_path);
        }
    }

    #[test]
    fn test_env_and_flag_names_are_unique() {
        let env_count = FIELDS.iter().filter(|d| d.env_var.is_some()).count();
        let flag_count = FIELDS.iter().filter(|d| d.cli_flag.is_some()).count();
        assert_eq!(registry().by_env.len(), env_count);
        assert_eq!(registry().by_flag.len(), flag_count);
    }

    #[test]
    fn test_lookups() {
        let registry = registry();
        assert_eq!(registry.path_for_env("SERVER_PORT"), Some("server.port"));
        assert_eq!(registry.path_for_flag("port"), Some("server.port"));
        assert_eq!(
            registry.path_for_env("TASK_EXECUTION_TIMEOUT_MAX"),
            Some("runtime.task_execution_timeout_max")
        );
        assert!(registry.path_for_flag("no-such-flag").is_none());
        assert_eq!(registry.get("server.port").map(|d| d.kind), Some(FieldKind::Integer));
    }

    #[test]
    fn test_structure_queries() {
        let registry = registry();
        assert!(registry.is_section("server"));
        assert!(registry.is_section("limits"));
        assert!(!registry.is_section("mode"));
        assert!(registry.is_compound("server.cors"));
        assert!(registry.is_compound("server.auth"));
        assert!(!registry.is_compound("server.port"));
    }

    #[test]
    fn test_secrets_are_sensitive() {
        let registry = registry();
        assert!(registry.is_sensitive("llm.api_key"));
        assert!(registry.is_sensitive("server.auth.admin_key"));
        assert!(registry.is_sensitive("database.password"));
        assert!(!registry.is_sensitive("database.user"));
        assert!(FIELDS
            .iter()
            .filter(|d| d.kind == FieldKind::Secret)
            .all(|d| d.sensitive));
    }

    #[test]
    fn test_default_values_convert() {
        assert_eq!(DefaultValue::Int(5001).to_value(), Value::from(5001));
        assert_eq!(DefaultValue::Duration("30s").to_value(), Value::from("30s"));
        assert_eq!(
            DefaultValue::List(&["a", "b"]).to_value(),
            serde_json::json!(["a", "b"])
        );
    }
}
