use crate::cli::MapArgs;
use crate::config::PartialDatabaseConfig;
use crate::error::Result;
use crate::utils::progress::CollectionProgress;
use deeprank::{
    engine::{config::Execution, mapping::accel},
    workflows,
};
use tracing::{info, warn};

pub fn run(args: MapArgs) -> Result<()> {
    let config = PartialDatabaseConfig::from_file(&args.config)?.merge_map(&args)?;

    if let Execution::Accelerated(block) = config.execution {
        match accel::detect_accelerator() {
            accel::AcceleratorStatus::Available { workers } => {
                info!(%block, workers, "Mapping with the grid-of-blocks executor");
            }
            accel::AcceleratorStatus::Unavailable { reason } => {
                warn!(%reason, "Blocks will run one at a time");
            }
        }
    }

    let progress = CollectionProgress::new();
    let reporter = progress.reporter();

    let summary = workflows::map::run(&args.database, &config, &reporter)?;
    println!(
        "Mapped {} conformation(s) in {}.",
        summary.mapped.len(),
        args.database.display()
    );
    if !summary.already_mapped.is_empty() {
        println!(
            "  {} conformation(s) already mapped; use --reset to map them again.",
            summary.already_mapped.len()
        );
    }
    if !summary.skipped.is_empty() {
        println!(
            "  {} conformation(s) could not be mapped; rerun with -v for details.",
            summary.skipped.len()
        );
    }
    if summary.zero_filled > 0 {
        println!("  {} grid channel(s) zero-filled.", summary.zero_filled);
    }
    progress.log_summary();
    Ok(())
}
