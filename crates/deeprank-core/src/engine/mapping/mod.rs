//! Grid mapping engine.
//!
//! Places a lattice around each conformation and rasterizes atomic densities
//! and per-atom features onto it, one channel at a time. Channels are
//! computed by [`cpu::rasterize`] or by the [`accel::BlockExecutor`]; both
//! produce the same values.

pub mod accel;
pub mod cpu;

use crate::core::grid::channel::MappedChannel;
use crate::core::grid::kernel::{Aggregation, GaussianKernel, PointSource};
use crate::core::grid::spec::GridAxes;
use crate::core::models::atom::Atom;
use crate::core::models::conformation::FeatureData;
use crate::core::models::structure::Structure;
use crate::engine::config::{Execution, MappingConfig};
use crate::engine::error::EngineError;
use accel::{AcceleratorStatus, BlockExecutor, detect_accelerator};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub type CombineFn = Arc<dyn Fn(f32, f32) -> f32 + Send + Sync>;

/// Binary operator joining the two per-chain rasters of a paired channel.
#[derive(Clone)]
pub enum CombineOp {
    Add,
    Subtract,
    Multiply,
    Max,
    Min,
    Custom(CombineFn),
}

impl CombineOp {
    #[inline]
    pub fn apply(&self, a: f32, b: f32) -> f32 {
        match self {
            CombineOp::Add => a + b,
            CombineOp::Subtract => a - b,
            CombineOp::Multiply => a * b,
            CombineOp::Max => a.max(b),
            CombineOp::Min => a.min(b),
            CombineOp::Custom(f) => f(a, b),
        }
    }

    pub fn custom(f: impl Fn(f32, f32) -> f32 + Send + Sync + 'static) -> Self {
        CombineOp::Custom(Arc::new(f))
    }
}

impl fmt::Debug for CombineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineOp::Add => f.write_str("Add"),
            CombineOp::Subtract => f.write_str("Subtract"),
            CombineOp::Multiply => f.write_str("Multiply"),
            CombineOp::Max => f.write_str("Max"),
            CombineOp::Min => f.write_str("Min"),
            CombineOp::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl FromStr for CombineOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(CombineOp::Add),
            "subtract" => Ok(CombineOp::Subtract),
            "multiply" => Ok(CombineOp::Multiply),
            "max" => Ok(CombineOp::Max),
            "min" => Ok(CombineOp::Min),
            other => Err(format!(
                "unknown combine operator '{other}' (expected add, subtract, multiply, max or min)"
            )),
        }
    }
}

/// How the two chains of a complex are laid out in paired channels.
#[derive(Debug, Clone, Default)]
pub enum ChainPairing {
    /// One channel per chain, named `<channel>_chain<id>`.
    #[default]
    Individual,
    /// Both chains rasterized separately and joined into one channel.
    Combined(CombineOp),
}

/// Lifecycle of one conformation through grid mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingState {
    Pending,
    GridConfigured,
    Rasterized,
    Sparsified,
    DenseStored,
    Stored,
    Failed,
}

impl MappingState {
    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(self, next: MappingState) -> Result<MappingState, EngineError> {
        use MappingState::*;
        let allowed = matches!(
            (self, next),
            (Pending, GridConfigured)
                | (GridConfigured, Rasterized)
                | (Rasterized, Sparsified)
                | (Rasterized, DenseStored)
                | (Sparsified, Stored)
                | (DenseStored, Stored)
        ) || (next == Failed && self != Stored);
        if allowed {
            Ok(next)
        } else {
            Err(EngineError::Internal(format!(
                "invalid mapping state transition {self:?} -> {next:?}"
            )))
        }
    }
}

/// Result of mapping one conformation.
#[derive(Debug)]
pub struct MappingOutcome {
    pub axes: GridAxes,
    pub channels: BTreeMap<String, MappedChannel>,
    /// Channels that were zero-filled, with the reason.
    pub failures: Vec<EngineError>,
    pub state: MappingState,
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Cpu,
    Blocks(BlockExecutor),
}

struct DensityChannel {
    atom_type: String,
    kernel: GaussianKernel,
    paired: bool,
}

/// Maps conformations according to one [`MappingConfig`].
pub struct MappingEngine<'a> {
    config: &'a MappingConfig,
    backend: Backend,
    feature_kernel: GaussianKernel,
    densities: Vec<DensityChannel>,
}

impl<'a> MappingEngine<'a> {
    pub fn new(config: &'a MappingConfig) -> Result<Self, EngineError> {
        let backend = match config.execution {
            Execution::Cpu => Backend::Cpu,
            Execution::Accelerated(block) => match detect_accelerator() {
                AcceleratorStatus::Available { workers } => {
                    debug!(workers, block = %block, "Using grid-of-blocks executor");
                    Backend::Blocks(BlockExecutor::new(block))
                }
                AcceleratorStatus::Unavailable { reason } => {
                    warn!("Accelerated mapping unavailable ({reason}); falling back to CPU");
                    Backend::Cpu
                }
            },
        };
        let feature_kernel =
            GaussianKernel::feature(config.grid.max_resolution(), config.feature_support)?;
        let densities = config
            .densities
            .iter()
            .map(|d| {
                Ok(DensityChannel {
                    atom_type: d.atom_type.clone(),
                    kernel: GaussianKernel::density(&d.atom_type, d.radius)?,
                    paired: d.paired,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Self {
            config,
            backend,
            feature_kernel,
            densities,
        })
    }

    pub fn uses_accelerator(&self) -> bool {
        matches!(self.backend, Backend::Blocks(_))
    }

    fn rasterize(
        &self,
        axes: &GridAxes,
        kernel: &GaussianKernel,
        source: &PointSource,
        aggregation: Aggregation,
    ) -> Vec<f32> {
        match &self.backend {
            Backend::Cpu => cpu::rasterize(axes, kernel, source, aggregation),
            Backend::Blocks(executor) => executor.rasterize(axes, kernel, source, aggregation),
        }
    }

    /// Fails when a paired channel is requested and the structure lacks one
    /// of the configured chains.
    fn check_chains(
        &self,
        structure: &Structure,
        feature_names: &[String],
    ) -> Result<(), EngineError> {
        let needs_pair = self.densities.iter().any(|d| d.paired)
            || feature_names
                .iter()
                .any(|name| self.config.paired_features.contains(name));
        if !needs_pair {
            return Ok(());
        }
        let found = structure.chain_ids();
        let (a, b) = self.config.chains;
        if found.contains(&a) && found.contains(&b) {
            Ok(())
        } else {
            Err(EngineError::MissingChains {
                chains: self.config.chains,
                found,
            })
        }
    }

    /// Maps one conformation: densities first, then the requested features.
    ///
    /// Channels whose atom set is empty or malformed are zero-filled and
    /// reported in [`MappingOutcome::failures`]; mapping carries on. A
    /// structure missing a chain needed by a paired channel fails as a whole
    /// with [`EngineError::MissingChains`].
    pub fn map(
        &self,
        structure: &Structure,
        features: &BTreeMap<String, FeatureData>,
        feature_names: &[String],
    ) -> Result<MappingOutcome, EngineError> {
        let mut state = MappingState::Pending;
        self.check_chains(structure, feature_names)?;
        let axes = self.config.grid.place_for(structure, &self.config.anchor);
        state = state.advance(MappingState::GridConfigured)?;

        let shape = axes.shape();
        let mut channels = BTreeMap::new();
        let mut failures = Vec::new();

        for density in &self.densities {
            self.map_channel(
                &axes,
                structure,
                ChannelRequest {
                    name: &density.atom_type,
                    kernel: &density.kernel,
                    aggregation: self.config.density_aggregation,
                    paired: density.paired,
                },
                |atoms| {
                    let positions = atoms
                        .iter()
                        .filter(|a| a.name == density.atom_type)
                        .map(|a| a.position)
                        .collect();
                    Ok(PointSource::unit(positions))
                },
                &mut channels,
                &mut failures,
            );
        }

        for name in feature_names {
            let values = match features.get(name) {
                Some(FeatureData::PerAtom(values)) if values.len() == structure.len() => {
                    Some(values)
                }
                _ => None,
            };
            self.map_channel(
                &axes,
                structure,
                ChannelRequest {
                    name,
                    kernel: &self.feature_kernel,
                    aggregation: self.config.feature_aggregation,
                    paired: self.config.paired_features.contains(name),
                },
                |atoms| {
                    let Some(values) = values else {
                        return Err(format!(
                            "feature is missing or not a per-atom array of {} values",
                            structure.len()
                        ));
                    };
                    let (positions, weights) = atoms
                        .iter()
                        .map(|a| (a.position, values[a.index]))
                        .unzip();
                    Ok(PointSource::weighted(positions, weights))
                },
                &mut channels,
                &mut failures,
            );
        }
        state = state.advance(MappingState::Rasterized)?;

        let channels = match self.config.sparsify {
            Some(threshold) => {
                state = state.advance(MappingState::Sparsified)?;
                channels
                    .into_iter()
                    .map(|(name, channel)| (name, channel.sparsify(threshold)))
                    .collect()
            }
            None => {
                state = state.advance(MappingState::DenseStored)?;
                channels
            }
        };

        debug_assert!(channels.values().all(|c: &MappedChannel| c.shape == shape));
        Ok(MappingOutcome {
            axes,
            channels,
            failures,
            state,
        })
    }

    /// Rasterizes one logical channel: over every atom when unpaired, per
    /// chain and laid out by the pairing otherwise.
    fn map_channel<F>(
        &self,
        axes: &GridAxes,
        structure: &Structure,
        request: ChannelRequest<'_>,
        build_source: F,
        channels: &mut BTreeMap<String, MappedChannel>,
        failures: &mut Vec<EngineError>,
    ) where
        F: Fn(&[IndexedAtom<'_>]) -> Result<PointSource, String>,
    {
        let shape = axes.shape();
        let mut raster = |chain: Option<char>, channel: &str| -> Vec<f32> {
            let atoms = indexed_atoms(structure, chain);
            let source = build_source(&atoms).and_then(|source| {
                if source.is_empty() {
                    Err(match chain {
                        Some(chain) => format!("no matching atoms on chain {chain}"),
                        None => "no matching atoms".to_string(),
                    })
                } else if !source.is_well_formed() {
                    Err("atom positions or values are not finite".into())
                } else {
                    Ok(source)
                }
            });
            match source {
                Ok(source) => self.rasterize(axes, request.kernel, &source, request.aggregation),
                Err(reason) => {
                    let err = EngineError::FeatureMapping {
                        channel: channel.to_string(),
                        reason,
                    };
                    warn!("{err}; channel zero-filled");
                    failures.push(err);
                    vec![0.0; axes.cell_count()]
                }
            }
        };

        let name = request.name;
        if !request.paired {
            let values = raster(None, name);
            channels.insert(name.to_string(), MappedChannel::dense(shape, values));
            return;
        }

        let (chain_a, chain_b) = self.config.chains;
        match &self.config.pairing {
            ChainPairing::Individual => {
                for chain in [chain_a, chain_b] {
                    let channel = format!("{name}_chain{chain}");
                    let values = raster(Some(chain), &channel);
                    channels.insert(channel, MappedChannel::dense(shape, values));
                }
            }
            ChainPairing::Combined(op) => {
                let a = raster(Some(chain_a), name);
                let b = raster(Some(chain_b), name);
                let values = a.iter().zip(&b).map(|(&x, &y)| op.apply(x, y)).collect();
                channels.insert(name.to_string(), MappedChannel::dense(shape, values));
            }
        }
    }
}

struct ChannelRequest<'r> {
    name: &'r str,
    kernel: &'r GaussianKernel,
    aggregation: Aggregation,
    paired: bool,
}

/// Resolves the feature channels to map against the features of the first
/// conformation.
///
/// With no explicit request every per-atom feature is mapped. Requested
/// features that are per-residue or scalar there cannot be spread onto atoms
/// and are rejected before any conformation is touched.
pub fn resolve_feature_names(
    requested: Option<&[String]>,
    first: &BTreeMap<String, FeatureData>,
) -> Result<Vec<String>, EngineError> {
    let Some(requested) = requested else {
        return Ok(first
            .iter()
            .filter(|(_, data)| data.is_per_atom())
            .map(|(name, _)| name.clone())
            .collect());
    };
    for name in requested {
        let reason = match first.get(name) {
            Some(FeatureData::PerResidue(_)) => "per-residue features are not supported",
            Some(FeatureData::Scalar(_)) => "scalar features have no atom positions",
            _ => continue,
        };
        return Err(EngineError::UnmappableFeature {
            name: name.clone(),
            reason: reason.to_string(),
        });
    }
    Ok(requested.to_vec())
}

/// An atom together with its index in the structure, which is the index
/// into per-atom feature arrays.
#[derive(Debug, Clone, Copy)]
pub struct IndexedAtom<'a> {
    pub index: usize,
    pub atom: &'a Atom,
}

impl std::ops::Deref for IndexedAtom<'_> {
    type Target = Atom;

    fn deref(&self) -> &Atom {
        self.atom
    }
}

/// Every atom, or only those of `chain`.
fn indexed_atoms(structure: &Structure, chain: Option<char>) -> Vec<IndexedAtom<'_>> {
    structure
        .atoms()
        .iter()
        .enumerate()
        .filter(|(_, atom)| chain.is_none_or(|c| atom.chain_id == c))
        .map(|(index, atom)| IndexedAtom { index, atom })
        .collect()
}
