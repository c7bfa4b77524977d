use thiserror::Error;

use super::config::ConfigError;
use super::features::FeatureError;
use crate::core::grid::spec::GridSpecError;
use crate::core::io::pdb::PdbError;
use crate::core::store::StoreError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse structure for '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: PdbError,
    },

    #[error("No reference structure '{reference}' found for '{name}'")]
    MissingReference { name: String, reference: String },

    #[error("'{name}' not found in any import source")]
    NotFound { name: String },

    #[error("Invalid grid specification: {0}")]
    InvalidGridSpec(#[from] GridSpecError),

    #[error("Failed to map channel '{channel}': {reason}")]
    FeatureMapping { channel: String, reason: String },

    #[error("Paired channels need chains {} and {}; the structure has {found:?}", .chains.0, .chains.1)]
    MissingChains { chains: (char, char), found: Vec<char> },

    #[error("Feature '{name}' cannot be mapped: {reason}")]
    UnmappableFeature { name: String, reason: String },

    #[error("Collection already exists at '{0}'")]
    AlreadyExists(PathBuf),

    #[error("Collection error: {0}")]
    Store(StoreError),

    #[error("Feature module error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(path) => EngineError::AlreadyExists(path),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Errors confined to one conformation; the run continues past them.
    pub fn is_per_conformation(&self) -> bool {
        matches!(
            self,
            EngineError::Parse { .. }
                | EngineError::MissingReference { .. }
                | EngineError::NotFound { .. }
                | EngineError::FeatureMapping { .. }
                | EngineError::MissingChains { .. }
        )
    }
}
