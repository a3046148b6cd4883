//! Source command - report which source set a key and its value

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use strata_config::registry;

use super::GlobalArgs;
use crate::ux_error;

#[derive(Args)]
pub struct SourceArgs {
    /// Dot-delimited key path, e.g. server.port
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(global: &GlobalArgs, args: SourceArgs) -> Result<()> {
    if registry().get(&args.key).is_none() {
        return Err(ux_error::unknown_key(&args.key).into());
    }

    let manager = super::load(global).await?;
    let report = manager.provenance_report()?;
    manager.close().await?;

    let entry = report
        .into_iter()
        .find(|entry| entry.key_path == args.key)
        .ok_or_else(|| ux_error::unknown_key(&args.key))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "{} = {} {}",
            entry.key_path.bold(),
            entry.value,
            format!("({})", entry.source).dimmed()
        );
    }
    Ok(())
}
