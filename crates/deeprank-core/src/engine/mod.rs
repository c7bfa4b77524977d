//! # Engine Module
//!
//! The logic layer between the stateless [`crate::core`] types and the
//! lifecycle [`crate::workflows`].
//!
//! - **Configuration** ([`config`]) - Typed settings with builders and eager validation
//! - **Discovery** ([`discovery`], [`catalog`]) - Finding structures, pairing decoys with
//!   natives, filtering and expanding augmentation replicas
//! - **Modules** ([`features`], [`modules`]) - The feature/target registry, import from
//!   existing collections and the built-in modules
//! - **Augmentation** ([`augment`]) - Random rigid rotations of replicas
//! - **Grid Mapping** ([`mapping`]) - Rasterization of densities and features on the CPU
//!   or the grid-of-blocks executor
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - The engine error taxonomy

pub mod augment;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod features;
pub mod mapping;
pub mod modules;
pub mod progress;
