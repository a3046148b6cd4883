use clap::Parser;
use std::process::ExitCode;
use strata_config::ConfigError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
pub mod ux_error;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match &cli.global.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Check(args) => commands::check::run(&cli.global, args).await,
        Commands::Show(args) => commands::show::run(&cli.global, args).await,
        Commands::Source(args) => commands::source::run(&cli.global, args).await,
        Commands::Keys(args) => commands::keys::run(args),
        Commands::Watch(args) => commands::watch::run(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ConfigError>() {
                Some(config_error) => ux_error::from_config_error(config_error).display(),
                None => match e.downcast_ref::<ux_error::UxError>() {
                    Some(ux) => ux.display(),
                    None => output::error(&format!("{e:#}")),
                },
            }
            ExitCode::FAILURE
        }
    }
}
