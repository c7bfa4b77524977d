//! Lattice geometry, kernels and channel storage.
//!
//! These are the pure data types of grid mapping. The rasterization loops
//! that fill channels live in [`crate::engine::mapping`].

pub mod channel;
pub mod kernel;
pub mod spec;
