use crate::cli::RemoveArgs;
use crate::error::Result;
use crate::utils::progress::CollectionProgress;
use deeprank::workflows::remove::{self, RemoveSelection};

/// The flags given, or the default selection when none is.
fn selection(args: &RemoveArgs) -> RemoveSelection {
    let chosen = RemoveSelection {
        features: args.features,
        structures: args.structures,
        grid_points: args.grid_points,
        mapped_features: args.mapped_features,
    };
    if chosen.is_empty() {
        RemoveSelection::default()
    } else {
        chosen
    }
}

pub fn run(args: RemoveArgs) -> Result<()> {
    let progress = CollectionProgress::new();
    let reporter = progress.reporter();

    let summary = remove::run(&args.database, &selection(&args), &reporter)?;
    println!(
        "Modified {} conformation(s); {} shrank from {} to {} bytes.",
        summary.modified,
        args.database.display(),
        summary.bytes_before,
        summary.bytes_after
    );
    progress.log_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn remove_args(extra: &[&str]) -> RemoveArgs {
        let mut args = vec!["deeprank", "remove", "train.db"];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Remove(args) => args,
            _ => panic!("Expected 'remove' subcommand"),
        }
    }

    #[test]
    fn no_flags_selects_the_default() {
        assert_eq!(selection(&remove_args(&[])), RemoveSelection::default());
    }

    #[test]
    fn flags_select_only_what_is_named() {
        let chosen = selection(&remove_args(&["--mapped-features"]));
        assert!(chosen.mapped_features);
        assert!(!chosen.features && !chosen.structures && !chosen.grid_points);
    }
}
