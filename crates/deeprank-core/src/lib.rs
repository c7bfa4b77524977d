//! # DeepRank Core Library
//!
//! Builds training databases of molecular conformations for structure
//! classifiers: native and decoy complexes, per-atom features, scalar
//! targets, rotated augmentation replicas, and features rasterized onto
//! regular 3-D grids.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Data models, the structure record reader
//!   and writer, grid geometry and kernels, and the persisted collection.
//!
//! - **[`engine`]: The Logic Core.** Conformation discovery and cataloguing,
//!   the feature/target module registry, augmentation, and the grid mapping
//!   engine with its CPU and grid-of-blocks execution paths.
//!
//! - **[`workflows`]: The Public API.** Complete database lifecycle
//!   operations: create, add features, add targets, map, remove and repack.

pub mod core;
pub mod engine;
pub mod workflows;
