//! # Core Module
//!
//! Stateless building blocks of the database generator.
//!
//! - [`models`]: atoms, structures and the persisted conformation record
//! - [`io`]: fixed-column structure records, read and written byte-exact
//! - [`grid`]: lattice geometry, Gaussian kernels and dense/sparse channels
//! - [`store`]: the append-only collection file holding one record per conformation
//! - [`utils`]: rigid rotations, naming conventions and static lookup tables

pub mod grid;
pub mod io;
pub mod models;
pub mod store;
pub mod utils;
