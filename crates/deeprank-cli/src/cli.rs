use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "DeepRank developers",
    version,
    about = "DeepRank CLI - Builds grid-mapped training databases of molecular conformations for structure classifiers.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used by the accelerated mapping path.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a new database from directories of structure files.
    Create(CreateArgs),
    /// Compute or import features into an existing database.
    AddFeatures(AppendArgs),
    /// Compute or import targets into an existing database.
    AddTargets(AppendArgs),
    /// Map features onto 3-D grids for every conformation of a database.
    Map(MapArgs),
    /// Remove features, structures or grids from every conformation and compact the database.
    Remove(RemoveArgs),
    /// Compact a database, dropping records superseded by later updates.
    Repack(RepackArgs),
    /// Time the accelerated mapping path for several block shapes.
    Tune(TuneArgs),
}

/// Arguments for the `create` subcommand.
#[derive(Args, Debug)]
pub struct CreateArgs {
    // --- Core Arguments ---
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path of the database to create. Must not exist yet.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Directory holding the complexes (decoys and natives). Can be repeated.
    #[arg(long = "complex-dir", value_name = "DIR")]
    pub complex_dirs: Vec<PathBuf>,

    /// Directory holding the native reference structures. Can be repeated.
    #[arg(long = "native-dir", value_name = "DIR")]
    pub native_dirs: Vec<PathBuf>,

    /// File listing the molecule identifiers to keep, one per line.
    #[arg(long, value_name = "PATH")]
    pub allow_list: Option<PathBuf>,

    // --- Augmentation Overrides ---
    /// Number of randomly rotated replicas per conformation.
    #[arg(short, long, value_name = "INT")]
    pub augment: Option<u32>,

    /// Seed for the replica rotations.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Module Overrides ---
    /// Feature modules to run, comma separated.
    #[arg(short = 'f', long = "feature", value_name = "NAME", value_delimiter = ',')]
    pub features: Vec<String>,

    /// Target modules to run, comma separated.
    #[arg(short = 't', long = "target", value_name = "NAME", value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Register a target read from a table, as NAME=PATH. Can be repeated.
    #[arg(long = "target-table", value_name = "NAME=PATH")]
    pub target_tables: Vec<String>,

    /// Existing database to copy features and targets from. Can be repeated.
    #[arg(long = "import-from", value_name = "PATH")]
    pub import_from: Vec<PathBuf>,

    /// Skip grid mapping even if the config file has a `[grid]` section.
    #[arg(long)]
    pub no_map: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S augmentation.count=5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `add-features` and `add-targets` subcommands.
#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Path of the database to update.
    #[arg(required = true, value_name = "DATABASE")]
    pub database: PathBuf,

    /// Modules to run, comma separated.
    #[arg(short, long = "module", value_name = "NAME", value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Register a target read from a table, as NAME=PATH. Can be repeated.
    #[arg(long = "target-table", value_name = "NAME=PATH")]
    pub target_tables: Vec<String>,

    /// Existing database to copy blocks from. Can be repeated.
    #[arg(long = "import-from", value_name = "PATH")]
    pub import_from: Vec<PathBuf>,
}

/// Arguments for the `map` subcommand.
#[derive(Args, Debug)]
pub struct MapArgs {
    /// Path of the database to map.
    #[arg(required = true, value_name = "DATABASE")]
    pub database: PathBuf,

    /// Configuration file with the `[grid]` and `[execution]` sections.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Discard existing grids and map every conformation again.
    #[arg(long)]
    pub reset: bool,

    /// Use the accelerated grid-of-blocks path.
    #[arg(long)]
    pub accelerated: bool,

    /// Block shape of the accelerated path, e.g. 8x8x8.
    #[arg(long, value_name = "XxYxZ")]
    pub block: Option<String>,

    /// Set a specific configuration value, overriding the config file.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Which members the `remove` subcommand drops.
///
/// Without any flag the default selection (features, structures and grid
/// points) is removed.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Path of the database to shrink.
    #[arg(required = true, value_name = "DATABASE")]
    pub database: PathBuf,

    /// Remove the feature blocks.
    #[arg(long)]
    pub features: bool,

    /// Remove the complex and native records where both are present.
    #[arg(long)]
    pub structures: bool,

    /// Remove the grid point coordinates.
    #[arg(long)]
    pub grid_points: bool,

    /// Remove the mapped feature grids.
    #[arg(long)]
    pub mapped_features: bool,
}

/// Arguments for the `repack` subcommand.
#[derive(Args, Debug)]
pub struct RepackArgs {
    /// Path of the database to compact.
    #[arg(required = true, value_name = "DATABASE")]
    pub database: PathBuf,
}

/// Arguments for the `tune` subcommand.
#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Grid points per axis of the synthetic workload.
    #[arg(long, default_value_t = 30, value_name = "INT")]
    pub points: usize,

    /// Number of atoms of the synthetic workload.
    #[arg(long, default_value_t = 500, value_name = "INT")]
    pub atoms: usize,

    /// Timed repetitions per block shape.
    #[arg(long, default_value_t = 3, value_name = "INT")]
    pub repeats: usize,

    /// Block shapes to compare, comma separated.
    #[arg(
        long = "block",
        value_name = "XxYxZ",
        value_delimiter = ',',
        default_value = "4x4x4,8x8x8,16x8x8,32x4x4"
    )]
    pub blocks: Vec<String>,
}
