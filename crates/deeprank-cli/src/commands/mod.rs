pub mod append;
pub mod create;
pub mod map;
pub mod remove;
pub mod repack;
pub mod tune;

use crate::error::{CliError, Result};
use deeprank::engine::features::ModuleRegistry;
use deeprank::engine::modules::TableTarget;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// The built-in modules plus one table target per `NAME=PATH` entry.
pub(crate) fn build_registry(tables: &BTreeMap<String, PathBuf>) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::with_builtins();
    for (name, path) in tables {
        debug!(target_name = %name, path = %path.display(), "Registering table target");
        let target = TableTarget::from_path(name, path).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        })?;
        registry.register_target(target);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn table_targets_are_registered_next_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irmsd.dat");
        fs::write(&path, "1AK4_7w 1.25\n1AK4_9w 7.5\n").unwrap();

        let tables = BTreeMap::from([("irmsd".to_string(), path)]);
        let registry = build_registry(&tables).unwrap();
        assert!(registry.target("irmsd").is_ok());
        assert!(registry.target("binary_class").is_ok());
        assert!(registry.feature("occupancy").is_ok());
    }

    #[test]
    fn missing_table_file_is_a_parsing_error() {
        let tables = BTreeMap::from([("irmsd".to_string(), PathBuf::from("/no/such/table.dat"))]);
        assert!(matches!(
            build_registry(&tables),
            Err(CliError::FileParsing { .. })
        ));
    }
}
