use super::build_registry;
use crate::cli::AppendArgs;
use crate::config::parse_target_tables;
use crate::error::{CliError, Result};
use crate::utils::progress::CollectionProgress;
use deeprank::{
    engine::config::AppendConfigBuilder,
    workflows::append::{self, AppendKind},
};
use tracing::info;

pub fn run(kind: AppendKind, args: AppendArgs) -> Result<()> {
    let tables = parse_target_tables(&args.target_tables)?;
    if kind == AppendKind::Features && !tables.is_empty() {
        return Err(CliError::Argument(
            "--target-table only applies to add-targets".to_string(),
        ));
    }
    let registry = build_registry(&tables)?;

    let mut modules = args.modules.clone();
    for name in tables.keys() {
        if !modules.contains(name) {
            modules.push(name.clone());
        }
    }
    let config = AppendConfigBuilder::new()
        .database_path(args.database.clone())
        .modules(modules)
        .import_from(args.import_from.clone())
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let progress = CollectionProgress::new();
    let reporter = progress.reporter();

    let summary = append::run(kind, &registry, &config, &reporter)?;
    info!(
        updated = summary.updated.len(),
        copied = summary.copied.len(),
        "Append workflow finished"
    );

    println!(
        "Updated {} conformation(s) and {} replica(s) in {}.",
        summary.updated.len(),
        summary.copied.len(),
        args.database.display()
    );
    if !summary.skipped.is_empty() {
        println!(
            "  {} conformation(s) left unchanged; rerun with -v for details.",
            summary.skipped.len()
        );
    }
    progress.log_summary();
    Ok(())
}
