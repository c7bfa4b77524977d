//! Feature and target modules, their registry, and import from existing collections.

use crate::core::models::conformation::{ConformationRecord, FeatureData};
use crate::core::models::structure::Structure;
use crate::core::store::{Database, StoreError};
use crate::engine::error::EngineError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("No {kind} module registered under '{name}'")]
    UnknownModule { kind: &'static str, name: String },
    #[error("Module '{module}' failed: {reason}")]
    Compute { module: String, reason: String },
    #[error("Feature '{feature}' has {found} values but the structure has {expected} {unit}")]
    LengthMismatch {
        feature: String,
        expected: usize,
        found: usize,
        unit: &'static str,
    },
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
}

/// Computes named feature blocks from a structure.
pub trait FeatureModule: Send + Sync {
    fn name(&self) -> &str;
    fn compute(&self, structure: &Structure) -> Result<BTreeMap<String, FeatureData>, FeatureError>;
}

/// What a target module sees: the conformation, its reference and its features.
#[derive(Debug, Clone, Copy)]
pub struct TargetContext<'a> {
    pub name: &'a str,
    pub complex: &'a Structure,
    pub native: Option<&'a Structure>,
    pub features: &'a BTreeMap<String, FeatureData>,
}

/// Computes named scalar targets for a conformation.
pub trait TargetModule: Send + Sync {
    fn name(&self) -> &str;
    fn compute(&self, ctx: &TargetContext<'_>) -> Result<BTreeMap<String, f64>, FeatureError>;
}

/// Modules available to a run, keyed by name. Populated once at startup.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    features: BTreeMap<String, Arc<dyn FeatureModule>>,
    targets: BTreeMap<String, Arc<dyn TargetModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the record-derived features and the binary class target.
    pub fn with_builtins() -> Self {
        use super::modules::{BinaryClassTarget, OccupancyFeature, TemperatureFactorFeature};
        let mut registry = Self::new();
        registry.register_feature(OccupancyFeature);
        registry.register_feature(TemperatureFactorFeature);
        registry.register_target(BinaryClassTarget);
        registry
    }

    pub fn register_feature(&mut self, module: impl FeatureModule + 'static) {
        self.features
            .insert(module.name().to_string(), Arc::new(module));
    }

    pub fn register_target(&mut self, module: impl TargetModule + 'static) {
        self.targets
            .insert(module.name().to_string(), Arc::new(module));
    }

    pub fn feature(&self, name: &str) -> Result<&dyn FeatureModule, FeatureError> {
        self.features
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| FeatureError::UnknownModule {
                kind: "feature",
                name: name.to_string(),
            })
    }

    pub fn target(&self, name: &str) -> Result<&dyn TargetModule, FeatureError> {
        self.targets
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| FeatureError::UnknownModule {
                kind: "target",
                name: name.to_string(),
            })
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Checks that every requested module is registered before any work starts.
    pub fn validate(&self, features: &[String], targets: &[String]) -> Result<(), FeatureError> {
        for name in features {
            self.feature(name)?;
        }
        for name in targets {
            self.target(name)?;
        }
        Ok(())
    }
}

/// Runs a feature module and checks its output against the structure.
///
/// Per-atom blocks must hold one value per atom, per-residue blocks one
/// value per residue.
pub fn compute_features(
    module: &dyn FeatureModule,
    structure: &Structure,
) -> Result<BTreeMap<String, FeatureData>, FeatureError> {
    let blocks = module.compute(structure)?;
    for (name, data) in &blocks {
        let (expected, found, unit) = match data {
            FeatureData::PerAtom(values) => (structure.len(), values.len(), "atoms"),
            FeatureData::PerResidue(values) => {
                (structure.residue_count(), values.len(), "residues")
            }
            FeatureData::Scalar(_) => continue,
        };
        if expected != found {
            return Err(FeatureError::LengthMismatch {
                feature: name.clone(),
                expected,
                found,
                unit,
            });
        }
    }
    debug!(module = module.name(), blocks = blocks.len(), "Computed features");
    Ok(blocks)
}

pub fn compute_targets(
    module: &dyn TargetModule,
    ctx: &TargetContext<'_>,
) -> Result<BTreeMap<String, f64>, FeatureError> {
    let targets = module.compute(ctx)?;
    debug!(module = module.name(), conformation = ctx.name, "Computed targets");
    Ok(targets)
}

/// Existing collections searched, in order, for precomputed blocks.
#[derive(Debug, Default)]
pub struct ImportSources {
    sources: Vec<Database>,
}

impl ImportSources {
    pub fn open(paths: &[PathBuf]) -> Result<Self, StoreError> {
        let sources = paths
            .iter()
            .map(Database::open_read_only)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources })
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The record of the first source holding a conformation called `name`.
    pub fn find(&self, name: &str) -> Result<Option<ConformationRecord>, StoreError> {
        for source in &self.sources {
            if let Some(record) = source.get(name)? {
                debug!(conformation = name, source = %source.path().display(), "Found import source");
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn import_features(
        &self,
        name: &str,
    ) -> Result<BTreeMap<String, FeatureData>, EngineError> {
        self.find(name)?
            .map(|record| record.features)
            .ok_or_else(|| EngineError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn import_targets(&self, name: &str) -> Result<BTreeMap<String, f64>, EngineError> {
        self.find(name)?
            .map(|record| record.targets)
            .ok_or_else(|| EngineError::NotFound {
                name: name.to_string(),
            })
    }
}
