//! Check command - load and validate without printing the snapshot

use anyhow::Result;
use clap::Args;
use strata_config::SourceType;

use super::GlobalArgs;
use crate::output;

#[derive(Args)]
pub struct CheckArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(global: &GlobalArgs, args: CheckArgs) -> Result<()> {
    let manager = super::load(global).await?;
    let metadata = manager.metadata();
    manager.close().await?;

    let overridden = metadata
        .sources
        .values()
        .filter(|source| **source != SourceType::Default)
        .count();

    if args.json {
        let report = serde_json::json!({
            "valid": true,
            "keys": metadata.sources.len(),
            "overridden": overridden,
            "loaded_at": metadata.loaded_at,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::success(&format!(
        "configuration valid ({} keys, {} overridden)",
        metadata.sources.len(),
        overridden
    ));
    Ok(())
}
