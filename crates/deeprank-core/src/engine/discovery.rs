use crate::engine::error::EngineError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A structure file offered for inclusion, identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub name: String,
    pub path: PathBuf,
}

impl Candidate {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        Some(Self::new(stem, path))
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
    }
}

/// Supplies the complexes to build records for and the native references to pair them with.
pub trait StructureSource {
    fn complexes(&self) -> Result<Vec<Candidate>, EngineError>;
    fn natives(&self) -> Result<Vec<Candidate>, EngineError>;
}

/// Lists structure files with a given extension in a set of directories (non-recursive).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    complex_dirs: Vec<PathBuf>,
    native_dirs: Vec<PathBuf>,
    extension: String,
}

impl DirectorySource {
    pub fn new(complex_dirs: Vec<PathBuf>, native_dirs: Vec<PathBuf>) -> Self {
        Self {
            complex_dirs,
            native_dirs,
            extension: "pdb".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    fn scan(&self, dirs: &[PathBuf]) -> Result<Vec<Candidate>, EngineError> {
        let mut found = Vec::new();
        for dir in dirs {
            let mut in_dir = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                let matches = path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
                if matches {
                    in_dir.extend(Candidate::from_path(&path));
                }
            }
            in_dir.sort();
            debug!(dir = %dir.display(), count = in_dir.len(), "Scanned structure directory");
            found.extend(in_dir);
        }
        Ok(found)
    }
}

impl StructureSource for DirectorySource {
    fn complexes(&self) -> Result<Vec<Candidate>, EngineError> {
        self.scan(&self.complex_dirs)
    }

    fn natives(&self) -> Result<Vec<Candidate>, EngineError> {
        self.scan(&self.native_dirs)
    }
}

/// A fixed list of candidates.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pub complexes: Vec<Candidate>,
    pub natives: Vec<Candidate>,
}

impl StructureSource for StaticSource {
    fn complexes(&self) -> Result<Vec<Candidate>, EngineError> {
        Ok(self.complexes.clone())
    }

    fn natives(&self) -> Result<Vec<Candidate>, EngineError> {
        Ok(self.natives.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_source_lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1AK4_7w.pdb", "1AK4_10w.PDB", "notes.txt", "1ATN.pdb"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdb")).unwrap();

        let source = DirectorySource::new(vec![dir.path().to_path_buf()], vec![]);
        let names: Vec<_> = source
            .complexes()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["1AK4_10w", "1AK4_7w", "1ATN"]);
        assert!(source.natives().unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let source = DirectorySource::new(vec![PathBuf::from("/definitely/not/here")], vec![]);
        assert!(matches!(source.complexes(), Err(EngineError::Io(_))));
    }

    #[test]
    fn custom_extension_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ent"), "").unwrap();
        std::fs::write(dir.path().join("b.pdb"), "").unwrap();
        let source =
            DirectorySource::new(vec![dir.path().to_path_buf()], vec![]).with_extension(".ent");
        let found = source.complexes().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), "a.ent");
    }
}
