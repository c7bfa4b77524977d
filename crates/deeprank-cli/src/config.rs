use crate::cli::{CreateArgs, MapArgs};
use crate::error::{CliError, Result};
use deeprank::core::grid::kernel::Aggregation;
use deeprank::core::grid::spec::Anchor;
use deeprank::engine::catalog::AllowList;
use deeprank::engine::config::{
    self as core_config, CreateConfigBuilder, DensitySpec, Execution, MappingConfigBuilder,
};
use deeprank::engine::discovery::DirectorySource;
use deeprank::engine::mapping::accel::BlockShape;
use deeprank::engine::mapping::{ChainPairing, CombineOp};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_EXTENSION: &str = "pdb";

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialDatabaseSection {
    path: Option<PathBuf>,
    include_hetatm: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSourcesSection {
    complex_dirs: Option<Vec<PathBuf>>,
    native_dirs: Option<Vec<PathBuf>>,
    extension: Option<String>,
    allow_list: Option<PathBuf>,
    import_from: Option<Vec<PathBuf>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialModulesSection {
    features: Option<Vec<String>>,
    targets: Option<Vec<String>>,
    target_tables: Option<BTreeMap<String, PathBuf>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialAugmentationSection {
    count: Option<u32>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialGridSection {
    points: Option<[usize; 3]>,
    resolution: Option<[f64; 3]>,
    anchor: Option<Anchor>,
    /// Atom type to density radius; the built-in radii when absent.
    densities: Option<BTreeMap<String, f64>>,
    features: Option<Vec<String>>,
    density_aggregation: Option<Aggregation>,
    feature_aggregation: Option<Aggregation>,
    feature_support: Option<f64>,
    chains: Option<[char; 2]>,
    /// `individual` or the name of a combine operator.
    pairing: Option<String>,
    /// Densities rasterized per chain; the others cover every atom.
    paired_densities: Option<Vec<String>>,
    /// Features rasterized per chain; the others cover every atom.
    paired_features: Option<Vec<String>>,
    /// Negligibility threshold; channels stay dense when absent.
    sparsify: Option<f32>,
    reset: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialExecutionSection {
    accelerated: Option<bool>,
    block: Option<BlockShape>,
}

/// The TOML configuration file, every field optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialDatabaseConfig {
    database: Option<PartialDatabaseSection>,
    sources: Option<PartialSourcesSection>,
    modules: Option<PartialModulesSection>,
    augmentation: Option<PartialAugmentationSection>,
    grid: Option<PartialGridSection>,
    execution: Option<PartialExecutionSection>,
}

/// Everything the `create` command needs.
#[derive(Debug)]
pub struct CreatePlan {
    pub config: core_config::CreateConfig,
    pub source: DirectorySource,
    pub target_tables: BTreeMap<String, PathBuf>,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn parse_pairing(value: &str) -> Result<ChainPairing> {
    if value.eq_ignore_ascii_case("individual") {
        return Ok(ChainPairing::Individual);
    }
    CombineOp::from_str(value)
        .map(ChainPairing::Combined)
        .map_err(CliError::Config)
}

/// Parses `NAME=PATH` target table arguments.
pub fn parse_target_tables(values: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    values
        .iter()
        .map(|kv| match kv.split_once('=') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => {
                Ok((name.to_string(), PathBuf::from(path)))
            }
            _ => Err(CliError::Argument(format!(
                "Invalid --target-table '{}'. Expected NAME=PATH.",
                kv
            ))),
        })
        .collect()
}

fn first_non_empty<T>(cli: &[T], file: Option<Vec<T>>) -> Vec<T>
where
    T: Clone,
{
    if cli.is_empty() {
        file.unwrap_or_default()
    } else {
        cli.to_vec()
    }
}

impl PartialDatabaseConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn merge_create(mut self, args: &CreateArgs) -> Result<CreatePlan> {
        self.apply_set_values(&args.set_values)?;

        let database = self.database.take().unwrap_or_default();
        let sources = self.sources.take().unwrap_or_default();
        let modules = self.modules.take().unwrap_or_default();
        let augmentation = self.augmentation.take().unwrap_or_default();

        let database_path = args.output.clone().or(database.path).ok_or_else(|| {
            CliError::Config(
                "A database path is required either in `database.path` or via --output."
                    .to_string(),
            )
        })?;

        let complex_dirs = first_non_empty(&args.complex_dirs, sources.complex_dirs);
        if complex_dirs.is_empty() {
            return Err(CliError::Config(
                "At least one complex directory is required in `sources.complex-dirs` or via --complex-dir."
                    .to_string(),
            ));
        }
        let native_dirs = first_non_empty(&args.native_dirs, sources.native_dirs);
        let extension = sources
            .extension
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let source = DirectorySource::new(complex_dirs, native_dirs).with_extension(&extension);

        let mut target_tables = modules.target_tables.unwrap_or_default();
        target_tables.extend(parse_target_tables(&args.target_tables)?);

        let features = first_non_empty(&args.features, modules.features);
        let mut targets = first_non_empty(&args.targets, modules.targets);
        for name in target_tables.keys() {
            if !targets.contains(name) {
                targets.push(name.clone());
            }
        }

        let mut builder = CreateConfigBuilder::new()
            .database_path(database_path)
            .include_hetatm(database.include_hetatm.unwrap_or(false))
            .augmentation(args.augment.or(augmentation.count).unwrap_or(0))
            .features(features)
            .targets(targets)
            .import_from(first_non_empty(&args.import_from, sources.import_from));

        if let Some(seed) = args.seed.or(augmentation.seed) {
            builder = builder.seed(seed);
        }
        if let Some(path) = args.allow_list.as_ref().or(sources.allow_list.as_ref()) {
            let allow_list = AllowList::from_path(path).map_err(|e| CliError::FileParsing {
                path: path.clone(),
                source: e.into(),
            })?;
            builder = builder.allow_list(allow_list);
        }
        if !args.no_map {
            if let Some(grid) = self.grid.take() {
                let execution = self.execution.take().unwrap_or_default();
                builder = builder.mapping(Self::merge_mapping(grid, execution, false, None)?);
            }
        }

        let config = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(CreatePlan {
            config,
            source,
            target_tables,
        })
    }

    pub fn merge_map(mut self, args: &MapArgs) -> Result<core_config::MappingConfig> {
        self.apply_set_values(&args.set_values)?;
        let grid = self.grid.take().ok_or_else(|| {
            CliError::Config("`grid` section is required for mapping.".to_string())
        })?;
        let mut execution = self.execution.take().unwrap_or_default();
        if args.accelerated {
            execution.accelerated = Some(true);
        }
        let block = args
            .block
            .as_deref()
            .map(|b| b.parse::<BlockShape>().map_err(CliError::Argument))
            .transpose()?;
        Self::merge_mapping(grid, execution, args.reset, block)
    }

    fn merge_mapping(
        grid: PartialGridSection,
        execution: PartialExecutionSection,
        reset: bool,
        block: Option<BlockShape>,
    ) -> Result<core_config::MappingConfig> {
        let mut densities = match grid.densities {
            Some(map) => map
                .into_iter()
                .map(|(atom_type, radius)| DensitySpec::new(&atom_type, radius))
                .collect(),
            None => DensitySpec::defaults(),
        };
        for atom_type in grid.paired_densities.unwrap_or_default() {
            let Some(index) = densities.iter().position(|d| d.atom_type == atom_type) else {
                return Err(CliError::Config(format!(
                    "paired density '{atom_type}' is not one of the configured densities"
                )));
            };
            densities[index] = densities[index].clone().chain_paired();
        }

        let mut builder = MappingConfigBuilder::new()
            .densities(densities)
            .reset(reset || grid.reset.unwrap_or(false))
            .sparsify(grid.sparsify);
        if let Some(points) = grid.points {
            builder = builder.points(points);
        }
        if let Some(resolution) = grid.resolution {
            builder = builder.resolution(resolution);
        }
        if let Some(anchor) = grid.anchor {
            builder = builder.anchor(anchor);
        }
        if let Some(features) = grid.features {
            builder = builder.features(features);
        }
        if let Some(aggregation) = grid.density_aggregation {
            builder = builder.density_aggregation(aggregation);
        }
        if let Some(aggregation) = grid.feature_aggregation {
            builder = builder.feature_aggregation(aggregation);
        }
        if let Some(support) = grid.feature_support {
            builder = builder.feature_support(support);
        }
        if let Some([first, second]) = grid.chains {
            builder = builder.chains(first, second);
        }
        if let Some(pairing) = grid.pairing.as_deref() {
            builder = builder.pairing(parse_pairing(pairing)?);
        }
        if let Some(features) = grid.paired_features {
            builder = builder.paired_features(features);
        }
        if execution.accelerated.unwrap_or(false) {
            let block = block.or(execution.block).unwrap_or_default();
            builder = builder.execution(Execution::Accelerated(block));
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "database.path" => {
                    self.database.get_or_insert_with(Default::default).path =
                        Some(PathBuf::from(value_str));
                }
                "augmentation.count" => {
                    self.augmentation.get_or_insert_with(Default::default).count =
                        Some(parse_value(key, value_str)?);
                }
                "augmentation.seed" => {
                    self.augmentation.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str)?);
                }
                "grid.sparsify" => {
                    self.grid.get_or_insert_with(Default::default).sparsify =
                        Some(parse_value(key, value_str)?);
                }
                "grid.reset" => {
                    self.grid.get_or_insert_with(Default::default).reset =
                        Some(parse_value(key, value_str)?);
                }
                "grid.pairing" => {
                    self.grid.get_or_insert_with(Default::default).pairing =
                        Some(value_str.to_string());
                }
                "grid.feature-support" => {
                    self.grid.get_or_insert_with(Default::default).feature_support =
                        Some(parse_value(key, value_str)?);
                }
                "execution.accelerated" => {
                    self.execution
                        .get_or_insert_with(Default::default)
                        .accelerated = Some(parse_value(key, value_str)?);
                }
                "execution.block" => {
                    self.execution.get_or_insert_with(Default::default).block =
                        Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
