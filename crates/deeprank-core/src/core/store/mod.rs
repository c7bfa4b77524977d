//! Persisted conformation collection.

pub mod database;
pub mod error;
pub mod frame;

pub use database::Database;
pub use error::StoreError;
