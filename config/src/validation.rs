//! # Configuration Validation
//!
//! Structural validation through the `validator` crate, followed by
//! cross-field rules that relate several fields to each other.
//!
//! Both passes always run and every violation is reported. When any
//! structural violation exists the combined list is a `Validation` error,
//! structural entries first; otherwise it is a `CrossField` error.

use crate::config::Config;
use crate::duration::format_duration;
use crate::error::ConfigError;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

const MAX_TCP_PORT: i64 = 65535;
const MIN_MIGRATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Validate a configuration snapshot.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Gate applied to every snapshot before it can become active.
///
/// ## Usage
/// ```rust
/// use strata_config::{Config, validation::validate};
///
/// let config = Config::default();
/// assert!(validate(&config).is_ok());
/// ```
///
/// ## Validation Rules
/// ### Structural
/// - Ports: 1-65535
/// - Enumerations: mode, database driver, SSL mode, environment, log level
/// - `server.auth.workflow_exceptions`: every id matches
///   `^[A-Za-z0-9][A-Za-z0-9_-]*$`
///
/// ### Cross-field
/// - Postgres without `conn_string` needs host, port, user and name
/// - Postgres `migration_timeout` must be at least 45s
/// - SQLite needs `database.path`
/// - Heartbeat interval < TTL < stale threshold
/// - Task timeouts are positive and default <= max
/// - Enabled authentication needs an admin key
/// - `database.port` and `redis.port` parse as TCP ports when set
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let structural = validate_structure(config).err().map(|e| e.violations());
    let cross_field = validate_cross_field(config).err().map(|e| e.violations());

    match (structural, cross_field) {
        (None, None) => Ok(()),
        (None, Some(violations)) => Err(ConfigError::CrossField { violations }),
        (Some(mut violations), cross_field) => {
            violations.extend(cross_field.unwrap_or_default());
            Err(ConfigError::Validation { violations })
        }
    }
}

/// Runs the field-level constraints declared on the schema.
pub fn validate_structure(config: &Config) -> Result<(), ConfigError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let mut violations = Vec::new();
            collect_violations("", &errors, &mut violations);
            violations.sort();
            Err(ConfigError::Validation { violations })
        }
    }
}

fn collect_violations(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                out.extend(
                    field_errors
                        .iter()
                        .map(|error| format!("{path}: {}", describe(error))),
                );
            }
            ValidationErrorsKind::Struct(nested) => collect_violations(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_violations(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let param = |name: &str| error.params.get(name).map(ToString::to_string);
    match error.code.as_ref() {
        "range" => match (param("min"), param("max"), param("value")) {
            (Some(min), Some(max), Some(value)) => {
                format!("must be between {min} and {max}, got {value}")
            }
            (Some(min), None, Some(value)) => format!("must be at least {min}, got {value}"),
            (None, Some(max), Some(value)) => format!("must be at most {max}, got {value}"),
            _ => "out of range".to_string(),
        },
        "length" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("length must be between {min} and {max}"),
            (Some(min), None) => format!("length must be at least {min}"),
            (None, Some(max)) => format!("length must be at most {max}"),
            _ => "invalid length".to_string(),
        },
        code => format!("failed {code} check"),
    }
}

/// Runs the rules that relate several fields to each other.
pub fn validate_cross_field(config: &Config) -> Result<(), ConfigError> {
    let mut violations = Vec::new();
    check_database(config, &mut violations);
    check_dispatcher_timing(config, &mut violations);
    check_task_timeouts(config, &mut violations);
    check_auth(config, &mut violations);
    check_ports(config, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::CrossField { violations })
    }
}

fn check_database(config: &Config, out: &mut Vec<String>) {
    let database = &config.database;
    match database.driver.as_str() {
        "postgres" => {
            if database.conn_string.trim().is_empty() {
                for (field, value) in [
                    ("host", &database.host),
                    ("port", &database.port),
                    ("user", &database.user),
                    ("name", &database.name),
                ] {
                    if value.trim().is_empty() {
                        out.push(format!(
                            "database.{field} is required when database.conn_string is empty"
                        ));
                    }
                }
            }
            if database.migration_timeout < MIN_MIGRATION_TIMEOUT {
                out.push(format!(
                    "database.migration_timeout must be >= 45s, got: {}",
                    format_duration(database.migration_timeout)
                ));
            }
        }
        "sqlite" => {
            if database.path.trim().is_empty() {
                out.push("database.path is required when database.driver is \"sqlite\"".to_string());
            }
        }
        _ => {}
    }
}

fn check_dispatcher_timing(config: &Config, out: &mut Vec<String>) {
    let runtime = &config.runtime;
    if runtime.dispatcher_heartbeat_ttl <= runtime.dispatcher_heartbeat_interval {
        out.push(format!(
            "dispatcher heartbeat TTL must be greater than heartbeat interval \
             (runtime.dispatcher_heartbeat_ttl={}, runtime.dispatcher_heartbeat_interval={})",
            format_duration(runtime.dispatcher_heartbeat_ttl),
            format_duration(runtime.dispatcher_heartbeat_interval),
        ));
    }
    if runtime.dispatcher_stale_threshold <= runtime.dispatcher_heartbeat_ttl {
        out.push(format!(
            "dispatcher stale threshold must be greater than heartbeat TTL \
             (runtime.dispatcher_stale_threshold={}, runtime.dispatcher_heartbeat_ttl={})",
            format_duration(runtime.dispatcher_stale_threshold),
            format_duration(runtime.dispatcher_heartbeat_ttl),
        ));
    }
}

fn check_task_timeouts(config: &Config, out: &mut Vec<String>) {
    let runtime = &config.runtime;
    let default_timeout = runtime.task_execution_timeout_default;
    let max_timeout = runtime.task_execution_timeout_max;

    if default_timeout.is_zero() {
        out.push("runtime.task_execution_timeout_default must be greater than 0, got: 0s".to_string());
    }
    if max_timeout.is_zero() {
        out.push("runtime.task_execution_timeout_max must be greater than 0, got: 0s".to_string());
    }
    if default_timeout > max_timeout {
        out.push(format!(
            "runtime.task_execution_timeout_default ({}) must not exceed runtime.task_execution_timeout_max ({})",
            format_duration(default_timeout),
            format_duration(max_timeout),
        ));
    }
    if runtime.tool_execution_timeout.is_zero() {
        out.push("runtime.tool_execution_timeout must be greater than 0, got: 0s".to_string());
    }
}

fn check_auth(config: &Config, out: &mut Vec<String>) {
    let auth = &config.server.auth;
    if auth.enabled && auth.admin_key.expose_secret().trim().is_empty() {
        out.push(
            "server.auth.admin_key is required when authentication is enabled (server.auth.enabled=true)"
                .to_string(),
        );
    }
}

fn check_ports(config: &Config, out: &mut Vec<String>) {
    for (key_path, value) in [
        ("redis.port", &config.redis.port),
        ("database.port", &config.database.port),
    ] {
        if value.trim().is_empty() {
            continue;
        }
        if let Err(message) = validate_tcp_port(value, key_path) {
            out.push(message);
        }
    }
}

/// Checks that `value` parses as a TCP port in 1-65535.
pub fn validate_tcp_port(value: &str, key_path: &str) -> Result<u16, String> {
    let port: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{key_path} must be a valid integer, got {value:?}"))?;
    if !(1..=MAX_TCP_PORT).contains(&port) {
        return Err(format!(
            "{key_path} must be between 1 and {MAX_TCP_PORT}, got {port}"
        ));
    }
    u16::try_from(port).map_err(|_| format!("{key_path} is out of range"))
}
