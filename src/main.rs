use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

mod budget;
mod cli;
mod command;
mod config;
mod domain;
mod error;
mod exec;
mod filters;
mod git;
mod pack;
mod pr;
mod rank;
mod recall;
mod render;
mod report;
mod tokens;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Pack(args)) => command::run_pack(args).await,
        Some(Commands::Preview(args)) => {
            command::run_preview(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Report { file, json }) => command::run_report(&file, json),
        None => command::run_pack(cli.pack).await,
    }
}
