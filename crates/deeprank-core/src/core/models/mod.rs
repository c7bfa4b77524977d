//! # Core Models Module
//!
//! Data structures describing conformations: atoms parsed from fixed-column
//! records, ordered atom sequences, and the persisted per-conformation record
//! that features, targets and mapped grids are attached to.
//!
//! - [`atom`] - One atom record with its columns
//! - [`structure`] - Ordered atom sequence with geometric helpers
//! - [`conformation`] - The persisted conformation group and its feature payloads

pub mod atom;
pub mod conformation;
pub mod structure;
