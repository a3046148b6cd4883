//! Show command - print the validated snapshot, optionally with provenance

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use strata_config::{ProvenanceEntry, SourceType};

use super::GlobalArgs;
use crate::output::{self, Format};

#[derive(Args)]
pub struct ShowArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,

    /// List every key with the source that set it
    #[arg(long)]
    pub provenance: bool,
}

pub async fn run(global: &GlobalArgs, args: ShowArgs) -> Result<()> {
    let manager = super::load(global).await?;
    let rendered = if args.provenance {
        let report = manager.provenance_report()?;
        match args.format {
            Format::Yaml => provenance_table(&report),
            Format::Json => output::render(&report, Format::Json)?,
            // TOML has no top-level arrays.
            Format::Toml => output::render(&serde_json::json!({ "key": report }), Format::Toml)?,
        }
    } else {
        let config = manager
            .get()
            .ok_or_else(|| anyhow::anyhow!("configuration was not loaded"))?;
        output::render(&*config, args.format)?
    };
    manager.close().await?;

    print!("{rendered}");
    Ok(())
}

fn provenance_table(report: &[ProvenanceEntry]) -> String {
    let width = report.iter().map(|e| e.key_path.len()).max().unwrap_or(0);
    let mut table = String::new();
    for entry in report {
        let source = match entry.source {
            SourceType::Default => entry.source.as_str().dimmed(),
            SourceType::File => entry.source.as_str().blue(),
            SourceType::Env => entry.source.as_str().yellow(),
            SourceType::Cli => entry.source.as_str().green(),
        };
        table.push_str(&format!(
            "{:<width$}  {:<7}  {}\n",
            entry.key_path, source, entry.value
        ));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_table_aligns_columns() {
        colored::control::set_override(false);
        let table = provenance_table(&[
            ProvenanceEntry {
                key_path: "mode".to_string(),
                source: SourceType::Default,
                value: "memory".to_string(),
            },
            ProvenanceEntry {
                key_path: "server.port".to_string(),
                source: SourceType::Cli,
                value: "6001".to_string(),
            },
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0].find("default"), lines[1].find("cli"));
        assert_eq!(lines[0].find("memory"), lines[1].find("6001"));
        assert!(lines[1].starts_with("server.port  cli"));
    }
}
