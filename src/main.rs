// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        // No command provided - show help
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = commands::load_config(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config);

    match command {
        Commands::Mirror { source } => commands::cmd_mirror(&source, &config, cli.quiet),

        Commands::Process {
            source,
            package_scope,
            no_package,
        } => commands::cmd_process(
            &source,
            package_scope.as_deref(),
            no_package,
            &config,
            cli.quiet,
        ),

        Commands::Validate { path, json } => {
            if !commands::cmd_validate(&path, json)? {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Package {
            path,
            scope,
            regenerate,
        } => commands::cmd_package(&path, scope.as_deref(), regenerate, &config, cli.quiet),

        Commands::Rename { path } => commands::cmd_rename(&path, cli.quiet),
    }
}
