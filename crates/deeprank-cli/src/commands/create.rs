use super::build_registry;
use crate::cli::CreateArgs;
use crate::config::PartialDatabaseConfig;
use crate::error::Result;
use crate::utils::progress::CollectionProgress;
use deeprank::workflows;
use tracing::{info, warn};

pub fn run(args: CreateArgs) -> Result<()> {
    let partial_config = PartialDatabaseConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let plan = partial_config.merge_create(&args)?;
    let registry = build_registry(&plan.target_tables)?;

    let progress = CollectionProgress::new();
    let reporter = progress.reporter();

    println!(
        "Creating database {}...",
        plan.config.database_path.display()
    );
    let summary = workflows::create::run(&plan.source, &registry, &plan.config, &reporter)?;
    info!(
        stored = summary.stored.len(),
        skipped = summary.skipped.len(),
        "Create workflow finished"
    );

    println!(
        "Stored {} conformation(s) in {}.",
        summary.stored.len(),
        plan.config.database_path.display()
    );
    if !summary.complex_only.is_empty() {
        println!(
            "  {} conformation(s) stored without a reference structure.",
            summary.complex_only.len()
        );
    }
    if !summary.skipped.is_empty() {
        warn!(skipped = ?summary.skipped, "Some conformations were left out");
        println!(
            "  {} conformation(s) left out; rerun with -v for details.",
            summary.skipped.len()
        );
    }
    if !summary.unmapped.is_empty() {
        println!(
            "  {} conformation(s) stored without grids; rerun with -v for details.",
            summary.unmapped.len()
        );
    }
    if summary.zero_filled > 0 {
        println!("  {} grid channel(s) zero-filled.", summary.zero_filled);
    }
    progress.log_summary();
    Ok(())
}
