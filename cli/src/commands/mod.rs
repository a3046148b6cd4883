pub mod check;
pub mod keys;
pub mod show;
pub mod source;
pub mod watch;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use strata_config::{CliSource, ConfigManager, EnvSource, FileSource, ManagerOptions, Source, registry};

use crate::output;

#[derive(Parser)]
#[command(
    name = "strata",
    author,
    version,
    about = "strata - layered configuration inspector",
    long_about = "Loads configuration from defaults, files, environment variables and --set \
                  overrides, in that order of precedence, and reports the validated result."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration files, applied in the order given
    #[arg(short, long = "config", global = true, env = "STRATA_CONFIG", value_delimiter = ',')]
    pub config: Vec<PathBuf>,

    /// Override a value by flag name, e.g. --set port=6001
    #[arg(long = "set", global = true, value_name = "FLAG=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,

    /// Ignore environment variables
    #[arg(long, global = true)]
    pub no_env: bool,

    /// Log filter directive (defaults to RUST_LOG, then "info")
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Load and validate configuration")]
    Check(check::CheckArgs),

    #[command(about = "Print the validated configuration")]
    Show(show::ShowArgs),

    #[command(about = "Show which source set a key")]
    Source(source::SourceArgs),

    #[command(about = "List every known key with its environment variable and flag")]
    Keys(keys::KeysArgs),

    #[command(about = "Follow configuration changes until interrupted")]
    Watch(watch::WatchArgs),
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((flag, value)) if !flag.trim().is_empty() => {
            Ok((flag.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FLAG=VALUE, got '{raw}'")),
    }
}

/// File and flag sources described by the global options, in precedence
/// order. The environment tier belongs to the manager, see [`manager`].
pub fn build_sources(global: &GlobalArgs) -> Vec<Arc<dyn Source>> {
    let mut sources: Vec<Arc<dyn Source>> = global
        .config
        .iter()
        .map(|path| Arc::new(FileSource::new(path)) as Arc<dyn Source>)
        .collect();

    if !global.overrides.is_empty() {
        for (flag, _) in &global.overrides {
            if registry().path_for_flag(flag).is_none() {
                output::warn(&format!("ignoring unknown flag '{flag}' (see `strata keys`)"));
            }
        }
        sources.push(Arc::new(CliSource::new(global.overrides.iter().cloned())));
    }
    sources
}

/// Unloaded manager honoring `--no-env`.
pub fn manager(global: &GlobalArgs) -> ConfigManager {
    ConfigManager::with_options(manager_options(global))
}

fn manager_options(global: &GlobalArgs) -> ManagerOptions {
    ManagerOptions {
        environment: (!global.no_env).then(EnvSource::new),
        ..ManagerOptions::default()
    }
}

/// Loads a manager from the global options.
pub async fn load(global: &GlobalArgs) -> Result<ConfigManager> {
    let manager = manager(global);
    manager.load(build_sources(global)).await?;
    Ok(manager)
}
