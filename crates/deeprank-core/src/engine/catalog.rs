use crate::core::utils::identifiers::{bare_name, is_native_name, replica_name};
use crate::engine::discovery::{Candidate, StructureSource};
use crate::engine::error::EngineError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Identifiers a conformation's file name must contain to be kept.
///
/// Files list one entry per line, either `<id> [...]` or `<class> <id>` with
/// a `0`/`1` class column. Blank lines and `#` comments are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: Vec<String>,
}

impl AllowList {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn parse(text: &str) -> Self {
        let ids = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut tokens = line.split_whitespace();
                let first = tokens.next()?;
                match (first, tokens.next()) {
                    ("0" | "1", Some(id)) => Some(id.to_string()),
                    _ => Some(first.to_string()),
                }
            })
            .collect();
        Self { ids }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.ids.iter().any(|id| file_name.contains(id.as_str()))
    }
}

/// One unit of work: a conformation or one of its augmentation replicas.
#[derive(Debug, Clone, PartialEq)]
pub struct ConformationJob {
    pub name: String,
    /// The conformation this job derives from; equal to `name` for plain jobs.
    pub origin: String,
    pub complex: PathBuf,
    pub native: Option<PathBuf>,
    pub replica: Option<u32>,
}

impl ConformationJob {
    pub fn is_replica(&self) -> bool {
        self.replica.is_some()
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub jobs: Vec<ConformationJob>,
    /// Conformations kept without a reference structure.
    pub missing_references: Vec<EngineError>,
}

impl Catalog {
    pub fn origins(&self) -> impl Iterator<Item = &ConformationJob> {
        self.jobs.iter().filter(|job| !job.is_replica())
    }

    pub fn replicas_of<'a>(&'a self, origin: &'a str) -> impl Iterator<Item = &'a ConformationJob> {
        self.jobs
            .iter()
            .filter(move |job| job.is_replica() && job.origin == origin)
    }
}

fn index_natives(pool: Vec<Candidate>) -> BTreeMap<String, PathBuf> {
    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for candidate in pool {
        grouped
            .entry(candidate.name)
            .or_default()
            .push(candidate.path);
    }
    grouped
        .into_iter()
        .filter_map(|(name, mut paths)| {
            paths.sort();
            paths.dedup();
            if paths.len() > 1 {
                warn!(
                    native = %name,
                    candidates = paths.len(),
                    chosen = %paths[0].display(),
                    "Several reference structures share one identifier; using the first"
                );
            }
            let first = paths.into_iter().next()?;
            Some((name, first))
        })
        .collect()
}

/// Classifies, pairs, filters and expands the source's structures into jobs.
///
/// A complex named like a native is paired with itself. A complex whose
/// reference cannot be found is still catalogued, without a
/// native; the condition is logged and collected in
/// [`Catalog::missing_references`].
pub fn build(
    source: &dyn StructureSource,
    allow_list: Option<&AllowList>,
    augmentation: u32,
) -> Result<Catalog, EngineError> {
    let complexes = source.complexes()?;
    let mut pool = source.natives()?;
    if pool.is_empty() {
        pool = complexes
            .iter()
            .filter(|c| is_native_name(&c.name))
            .cloned()
            .collect();
    }
    let natives = index_natives(pool);

    let mut catalog = Catalog::default();
    let mut seen = std::collections::HashSet::new();
    for candidate in complexes {
        if let Some(allow) = allow_list {
            if !allow.matches(candidate.file_name()) {
                continue;
            }
        }
        if !seen.insert(candidate.name.clone()) {
            warn!(
                name = %candidate.name,
                path = %candidate.path.display(),
                "Duplicate conformation name; keeping the first occurrence"
            );
            continue;
        }

        let reference = bare_name(&candidate.name);
        // a native offered as a complex is its own reference
        let native = if is_native_name(&candidate.name) {
            Some(candidate.path.clone())
        } else {
            natives.get(reference).cloned()
        };
        if native.is_none() {
            let err = EngineError::MissingReference {
                name: candidate.name.clone(),
                reference: reference.to_string(),
            };
            warn!("{err}; storing the complex only");
            catalog.missing_references.push(err);
        }

        let origin = candidate.name;
        catalog.jobs.push(ConformationJob {
            name: origin.clone(),
            origin: origin.clone(),
            complex: candidate.path.clone(),
            native: native.clone(),
            replica: None,
        });
        for k in 1..=augmentation {
            catalog.jobs.push(ConformationJob {
                name: replica_name(&origin, k),
                origin: origin.clone(),
                complex: candidate.path.clone(),
                native: native.clone(),
                replica: Some(k),
            });
        }
    }

    info!(
        conformations = catalog.origins().count(),
        jobs = catalog.jobs.len(),
        "Built conformation catalog"
    );
    Ok(catalog)
}
