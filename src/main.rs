//! Resonera CLI - Neural Entrainment Audio Engine
//!
//! Command-line interface for the Resonera session generator.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use resonera::cli::commands;
use resonera::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Resonera v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Resonera v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Generate {
            spec,
            output,
            config,
            bit_depth,
            metadata,
            stream,
        } => commands::generate(
            &spec,
            &output,
            config.as_deref(),
            bit_depth,
            metadata.as_deref(),
            stream,
        )
        .with_context(|| format!("failed to generate session from {}", spec.display())),
        Commands::Validate { spec, config } => commands::validate(&spec, config.as_deref())
            .with_context(|| format!("session {} failed validation", spec.display())),
        Commands::Plan {
            from,
            to,
            duration,
            style,
        } => commands::plan(from, to, duration, style).context("transition planning failed"),
        Commands::Bands => commands::bands().context("failed to list bands"),
    }
}
