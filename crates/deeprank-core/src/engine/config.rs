use crate::core::grid::kernel::Aggregation;
use crate::core::grid::spec::{Anchor, GridSpec, GridSpecError};
use crate::core::io::pdb::ReadOptions;
use crate::core::utils::identifiers::DEFAULT_DENSITY_RADII;
use crate::engine::catalog::AllowList;
use crate::engine::mapping::ChainPairing;
use crate::engine::mapping::accel::BlockShape;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid parameter: {0}")]
    Invalid(#[from] GridSpecError),
    #[error("Paired mapping needs two distinct chains, got '{0}' twice")]
    InvalidChains(char),
}

/// Chains mapped when none are configured.
pub const DEFAULT_CHAINS: (char, char) = ('A', 'B');

/// One atomic density channel: atoms named `atom_type` smeared with `radius`.
///
/// An unpaired density covers every matching atom of the structure. A paired
/// one is rasterized per configured chain and laid out by
/// [`MappingConfig::pairing`].
#[derive(Debug, Clone, PartialEq)]
pub struct DensitySpec {
    pub atom_type: String,
    pub radius: f64,
    pub paired: bool,
}

impl DensitySpec {
    pub fn new(atom_type: &str, radius: f64) -> Self {
        Self {
            atom_type: atom_type.to_string(),
            radius,
            paired: false,
        }
    }

    pub fn chain_paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// The built-in C, N, O and S densities.
    pub fn defaults() -> Vec<Self> {
        let mut specs: Vec<Self> = DEFAULT_DENSITY_RADII
            .entries()
            .map(|(name, &radius)| Self::new(name, radius))
            .collect();
        specs.sort_by(|a, b| a.atom_type.cmp(&b.atom_type));
        specs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Execution {
    #[default]
    Cpu,
    Accelerated(BlockShape),
}

#[derive(Debug, Clone)]
pub struct MappingConfig {
    pub grid: GridSpec,
    pub anchor: Anchor,
    pub densities: Vec<DensitySpec>,
    /// Per-atom features to map; `None` maps every per-atom feature found
    /// on the first conformation.
    pub features: Option<Vec<String>>,
    pub density_aggregation: Aggregation,
    pub feature_aggregation: Aggregation,
    /// Support radius of the feature kernel; defaults to three sigma.
    pub feature_support: Option<f64>,
    /// Features rasterized separately for the two chains; the rest cover all atoms.
    pub paired_features: BTreeSet<String>,
    /// The chain pair used by paired densities and features.
    pub chains: (char, char),
    /// Layout of paired channels.
    pub pairing: ChainPairing,
    /// Negligibility threshold; `None` stores every channel dense.
    pub sparsify: Option<f32>,
    pub execution: Execution,
    /// Discard and regenerate existing grids instead of skipping mapped conformations.
    pub reset: bool,
}

#[derive(Default)]
pub struct MappingConfigBuilder {
    points: Option<[usize; 3]>,
    resolution: Option<[f64; 3]>,
    anchor: Option<Anchor>,
    densities: Option<Vec<DensitySpec>>,
    features: Option<Vec<String>>,
    density_aggregation: Option<Aggregation>,
    feature_aggregation: Option<Aggregation>,
    feature_support: Option<f64>,
    paired_features: BTreeSet<String>,
    chains: Option<(char, char)>,
    pairing: Option<ChainPairing>,
    sparsify: Option<f32>,
    execution: Option<Execution>,
    reset: bool,
}

impl MappingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(mut self, points: [usize; 3]) -> Self {
        self.points = Some(points);
        self
    }
    pub fn resolution(mut self, resolution: [f64; 3]) -> Self {
        self.resolution = Some(resolution);
        self
    }
    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }
    pub fn densities(mut self, densities: Vec<DensitySpec>) -> Self {
        self.densities = Some(densities);
        self
    }
    pub fn features(mut self, features: Vec<String>) -> Self {
        self.features = Some(features);
        self
    }
    pub fn density_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.density_aggregation = Some(aggregation);
        self
    }
    pub fn feature_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.feature_aggregation = Some(aggregation);
        self
    }
    pub fn feature_support(mut self, support: f64) -> Self {
        self.feature_support = Some(support);
        self
    }
    pub fn paired_features(mut self, features: impl IntoIterator<Item = String>) -> Self {
        self.paired_features = features.into_iter().collect();
        self
    }
    pub fn chains(mut self, first: char, second: char) -> Self {
        self.chains = Some((first, second));
        self
    }
    pub fn pairing(mut self, pairing: ChainPairing) -> Self {
        self.pairing = Some(pairing);
        self
    }
    pub fn sparsify(mut self, threshold: Option<f32>) -> Self {
        self.sparsify = threshold;
        self
    }
    pub fn execution(mut self, execution: Execution) -> Self {
        self.execution = Some(execution);
        self
    }
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn build(self) -> Result<MappingConfig, ConfigError> {
        let grid = GridSpec::new(
            self.points.ok_or(ConfigError::MissingParameter("points"))?,
            self.resolution
                .ok_or(ConfigError::MissingParameter("resolution"))?,
        )?;

        let anchor = self.anchor.unwrap_or_default();
        anchor.validate()?;

        let densities = self.densities.unwrap_or_default();
        for density in &densities {
            if !(density.radius.is_finite() && density.radius > 0.0) {
                return Err(GridSpecError::InvalidRadius {
                    atom_type: density.atom_type.clone(),
                    radius: density.radius,
                }
                .into());
            }
        }
        if let Some((first, second)) = self.chains {
            if first == second {
                return Err(ConfigError::InvalidChains(first));
            }
        }
        if let Some(support) = self.feature_support {
            if !(support.is_finite() && support > 0.0) {
                return Err(GridSpecError::InvalidSupport(support).into());
            }
        }
        if let Some(threshold) = self.sparsify {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(GridSpecError::InvalidThreshold(f64::from(threshold)).into());
            }
        }

        Ok(MappingConfig {
            grid,
            anchor,
            densities,
            features: self.features,
            density_aggregation: self.density_aggregation.unwrap_or_default(),
            feature_aggregation: self.feature_aggregation.unwrap_or_default(),
            feature_support: self.feature_support,
            paired_features: self.paired_features,
            chains: self.chains.unwrap_or(DEFAULT_CHAINS),
            pairing: self.pairing.unwrap_or_default(),
            sparsify: self.sparsify,
            execution: self.execution.unwrap_or_default(),
            reset: self.reset,
        })
    }
}

/// Settings of the database creation phase.
#[derive(Debug, Clone)]
pub struct CreateConfig {
    pub database_path: PathBuf,
    pub allow_list: Option<AllowList>,
    /// Number of rotated replicas per conformation.
    pub augmentation: u32,
    /// Seed for the replica rotations; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub read_options: ReadOptions,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    /// Existing collections searched, in order, for precomputed features and targets.
    pub import_from: Vec<PathBuf>,
    pub mapping: Option<MappingConfig>,
}

#[derive(Default)]
pub struct CreateConfigBuilder {
    database_path: Option<PathBuf>,
    allow_list: Option<AllowList>,
    augmentation: u32,
    seed: Option<u64>,
    read_options: ReadOptions,
    features: Vec<String>,
    targets: Vec<String>,
    import_from: Vec<PathBuf>,
    mapping: Option<MappingConfig>,
}

impl CreateConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(path);
        self
    }
    pub fn allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = Some(allow_list);
        self
    }
    pub fn augmentation(mut self, replicas: u32) -> Self {
        self.augmentation = replicas;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn include_hetatm(mut self, include: bool) -> Self {
        self.read_options.include_hetatm = include;
        self
    }
    pub fn features(mut self, modules: Vec<String>) -> Self {
        self.features = modules;
        self
    }
    pub fn targets(mut self, modules: Vec<String>) -> Self {
        self.targets = modules;
        self
    }
    pub fn import_from(mut self, sources: Vec<PathBuf>) -> Self {
        self.import_from = sources;
        self
    }
    pub fn mapping(mut self, mapping: MappingConfig) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn build(self) -> Result<CreateConfig, ConfigError> {
        Ok(CreateConfig {
            database_path: self
                .database_path
                .ok_or(ConfigError::MissingParameter("database_path"))?,
            allow_list: self.allow_list,
            augmentation: self.augmentation,
            seed: self.seed,
            read_options: self.read_options,
            features: self.features,
            targets: self.targets,
            import_from: self.import_from,
            mapping: self.mapping,
        })
    }
}

/// Settings of the feature and target append phases.
#[derive(Debug, Clone)]
pub struct AppendConfig {
    pub database_path: PathBuf,
    pub modules: Vec<String>,
    pub import_from: Vec<PathBuf>,
}

#[derive(Default)]
pub struct AppendConfigBuilder {
    database_path: Option<PathBuf>,
    modules: Vec<String>,
    import_from: Vec<PathBuf>,
}

impl AppendConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(path);
        self
    }
    pub fn modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }
    pub fn import_from(mut self, sources: Vec<PathBuf>) -> Self {
        self.import_from = sources;
        self
    }

    pub fn build(self) -> Result<AppendConfig, ConfigError> {
        let database_path = self
            .database_path
            .ok_or(ConfigError::MissingParameter("database_path"))?;
        if self.modules.is_empty() && self.import_from.is_empty() {
            return Err(ConfigError::MissingParameter("modules"));
        }
        Ok(AppendConfig {
            database_path,
            modules: self.modules,
            import_from: self.import_from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_builder_requires_grid_dimensions() {
        let err = MappingConfigBuilder::new()
            .resolution([1.0; 3])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("points"));
        let err = MappingConfigBuilder::new().points([4; 3]).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("resolution"));
    }

    #[test]
    fn mapping_builder_applies_defaults() {
        let config = MappingConfigBuilder::new()
            .points([30, 30, 30])
            .resolution([1.0, 1.0, 1.0])
            .build()
            .unwrap();
        assert_eq!(config.chains, ('A', 'B'));
        assert_eq!(config.density_aggregation, Aggregation::Sum);
        assert_eq!(config.anchor, Anchor::default());
        assert!(matches!(config.pairing, ChainPairing::Individual));
        assert!(config.paired_features.is_empty());
        assert_eq!(config.execution, Execution::Cpu);
        assert!(config.features.is_none());
        assert!(!config.reset);
    }

    #[test]
    fn mapping_builder_validates_eagerly() {
        let base = || MappingConfigBuilder::new().points([4; 3]).resolution([1.0; 3]);
        assert!(matches!(
            MappingConfigBuilder::new().points([4, 0, 4]).resolution([1.0; 3]).build(),
            Err(ConfigError::Invalid(GridSpecError::NonPositivePoints { .. }))
        ));
        assert!(matches!(
            base().densities(vec![DensitySpec::new("C", -1.0)]).build(),
            Err(ConfigError::Invalid(GridSpecError::InvalidRadius { .. }))
        ));
        assert!(base().sparsify(Some(-0.1)).build().is_err());
        assert!(base().feature_support(0.0).build().is_err());
        assert!(base().sparsify(Some(0.0)).build().is_ok());
        assert_eq!(
            base().chains('A', 'A').build().unwrap_err(),
            ConfigError::InvalidChains('A')
        );
    }

    #[test]
    fn densities_are_unpaired_unless_asked() {
        assert!(!DensitySpec::new("C", 1.7).paired);
        assert!(DensitySpec::new("C", 1.7).chain_paired().paired);
        assert!(DensitySpec::defaults().iter().all(|d| !d.paired));
    }

    #[test]
    fn default_densities_are_sorted() {
        let names: Vec<_> = DensitySpec::defaults()
            .into_iter()
            .map(|d| d.atom_type)
            .collect();
        assert_eq!(names, vec!["C", "N", "O", "S"]);
    }

    #[test]
    fn create_builder_requires_database_path() {
        assert_eq!(
            CreateConfigBuilder::new().build().unwrap_err(),
            ConfigError::MissingParameter("database_path")
        );
        let config = CreateConfigBuilder::new()
            .database_path(PathBuf::from("train.db"))
            .augmentation(2)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(config.augmentation, 2);
        assert_eq!(config.seed, Some(7));
        assert!(!config.read_options.include_hetatm);
    }

    #[test]
    fn append_builder_requires_work() {
        let err = AppendConfigBuilder::new()
            .database_path(PathBuf::from("train.db"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("modules"));
    }
}
