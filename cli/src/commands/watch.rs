//! Watch command - print each reload until interrupted

use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use strata_config::duration::parse_duration;
use strata_config::precedence::flatten;
use strata_config::Config;

use super::GlobalArgs;
use crate::output;

#[derive(Args)]
pub struct WatchArgs {
    /// Quiet period after the last file change before reloading
    #[arg(long, default_value = "100ms", value_parser = parse_debounce)]
    pub debounce: Duration,
}

fn parse_debounce(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

pub async fn run(global: &GlobalArgs, args: WatchArgs) -> Result<()> {
    if global.config.is_empty() {
        output::warn("no --config file given; nothing will trigger a reload");
    }

    let manager = super::manager(global);
    manager.set_debounce(args.debounce);

    let seen: Arc<Mutex<BTreeMap<String, Value>>> = Arc::default();
    manager.on_change(move |config| {
        let current = leaves(&config);
        let mut previous = seen.lock();
        let stamp = Local::now().format("%H:%M:%S%.3f");
        if previous.is_empty() {
            println!("{} loaded {} keys", stamp.to_string().dimmed(), current.len());
        } else {
            for (key_path, value) in changed(&previous, &current) {
                println!("{} {} = {}", stamp.to_string().dimmed(), key_path.bold(), value);
            }
        }
        *previous = current;
    });

    manager.load(super::build_sources(global)).await?;
    output::success("watching for changes, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    manager.close().await?;
    Ok(())
}

/// Leaves of `current` that are new or differ from `previous`.
fn changed<'a>(
    previous: &BTreeMap<String, Value>,
    current: &'a BTreeMap<String, Value>,
) -> impl Iterator<Item = (&'a String, &'a Value)> {
    current
        .iter()
        .filter(move |(key_path, value)| previous.get(*key_path) != Some(*value))
}

fn leaves(config: &Config) -> BTreeMap<String, Value> {
    match serde_json::to_value(config) {
        Ok(Value::Object(map)) => flatten(&map),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debounce() {
        assert_eq!(parse_debounce("250ms"), Ok(Duration::from_millis(250)));
        assert!(parse_debounce("soon").is_err());
    }

    #[test]
    fn test_changed_reports_only_differing_leaves() {
        let previous = leaves(&Config::default());
        let mut config = Config::default();
        config.server.port = 6001;
        let current = leaves(&config);

        let changes: Vec<_> = changed(&previous, &current).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0], (&"server.port".to_string(), &Value::from(6001)));
    }

    #[test]
    fn test_leaves_are_redacted() {
        let mut config = Config::default();
        config.llm.api_key = "sk-test-123".into();
        let leaves = leaves(&config);
        assert_eq!(leaves["server.port"], Value::from(5001));
        assert_eq!(
            leaves["llm.api_key"],
            Value::String(strata_config::REDACTION_MARKER.to_string())
        );
    }
}
