//! Keys command - list the descriptor table

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use strata_config::{REDACTION_MARKER, registry};

use crate::output;

#[derive(Args)]
pub struct KeysArgs {
    /// Only keys under this section, e.g. server
    #[arg(long)]
    pub section: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct KeyRow {
    key_path: &'static str,
    kind: &'static str,
    env_var: Option<&'static str>,
    flag: Option<&'static str>,
    default: serde_json::Value,
    help: &'static str,
}

pub fn run(args: KeysArgs) -> Result<()> {
    let rows: Vec<KeyRow> = registry()
        .fields()
        .iter()
        .filter(|d| match &args.section {
            Some(section) => d.key_path.split('.').next() == Some(section.as_str()),
            None => true,
        })
        .map(|d| KeyRow {
            key_path: d.key_path,
            kind: d.kind.as_str(),
            env_var: d.env_var,
            flag: d.cli_flag,
            default: if d.sensitive {
                serde_json::Value::String(REDACTION_MARKER.to_string())
            } else {
                d.default.to_value()
            },
            help: d.help,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    output::header("Configuration keys");
    for row in rows {
        println!();
        println!("  {} {}", row.key_path.bold(), format!("<{}>", row.kind).dimmed());
        println!("    {}", row.help);
        println!("    {} {}", "default:".dimmed(), row.default);
        if let Some(env_var) = row.env_var {
            println!("    {} {}", "env:".dimmed(), env_var.cyan());
        }
        if let Some(flag) = row.flag {
            println!("    {} --set {}=...", "flag:".dimmed(), flag.cyan());
        }
    }
    Ok(())
}
