mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use deeprank::workflows::append::AppendKind;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    info!("DeepRank CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    let command_result = match cli.command {
        Commands::Create(args) => {
            info!("Dispatching to 'create' command.");
            commands::create::run(args)
        }
        Commands::AddFeatures(args) => {
            info!("Dispatching to 'add-features' command.");
            commands::append::run(AppendKind::Features, args)
        }
        Commands::AddTargets(args) => {
            info!("Dispatching to 'add-targets' command.");
            commands::append::run(AppendKind::Targets, args)
        }
        Commands::Map(args) => {
            info!("Dispatching to 'map' command.");
            commands::map::run(args)
        }
        Commands::Remove(args) => {
            info!("Dispatching to 'remove' command.");
            commands::remove::run(args)
        }
        Commands::Repack(args) => {
            info!("Dispatching to 'repack' command.");
            commands::repack::run(args)
        }
        Commands::Tune(args) => {
            info!("Dispatching to 'tune' command.");
            commands::tune::run(args)
        }
    };

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    command_result
}
