//! # Workflows Module
//!
//! High-level entry points for the phases of a database's life. Each workflow
//! opens the collection for the duration of its phase, loops sequentially over
//! the conformations, and reports progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter).
//!
//! ## Phases
//!
//! - **Create** ([`create`]) - Catalogs source structures, attaches features
//!   and targets, generates augmentation replicas and optionally maps grids.
//! - **Append** ([`append`]) - Upserts features or targets into an existing
//!   collection; replicas are refreshed by copy from their origin.
//! - **Map** ([`map`]) - Rasterizes grids for every stored conformation.
//! - **Remove** ([`remove`]) - Drops selected members from every record and
//!   compacts the collection.
//! - **Repack** ([`repack`]) - Compacts a collection without changing it.
//!
//! Errors confined to one conformation are logged and the loop continues;
//! configuration errors abort before any record is touched.

pub mod append;
pub mod create;
pub mod map;
pub mod remove;
pub mod repack;
