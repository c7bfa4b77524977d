//! Reading and writing fixed-column atom-record structure files.
//!
//! The reader keeps every column of an `ATOM` record (and optionally `HETATM`)
//! so the writer can re-emit a parsed record byte for byte.

pub mod pdb;
pub mod traits;
