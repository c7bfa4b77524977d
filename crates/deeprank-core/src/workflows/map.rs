use crate::core::io::pdb::{self, PdbError, ReadOptions};
use crate::core::models::conformation::ConformationRecord;
use crate::core::models::structure::Structure;
use crate::core::store::Database;
use crate::engine::config::MappingConfig;
use crate::engine::error::EngineError;
use crate::engine::mapping::{MappingEngine, MappingState, resolve_feature_names};
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::Path;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSummary {
    pub mapped: Vec<String>,
    /// Conformations that already carried grids and were left as they were.
    pub already_mapped: Vec<String>,
    /// Conformations kept without grids, because their complex could not be
    /// read or lacks a chain that a paired channel needs.
    pub skipped: Vec<String>,
    /// Channels zero-filled across all mapped conformations.
    pub zero_filled: usize,
}

/// Re-parses the complex stored in a record.
///
/// Stored records are exactly the atoms kept at creation, so hetero atoms
/// are accepted here regardless of how the collection was built.
pub(crate) fn stored_complex(
    name: &str,
    record: &ConformationRecord,
) -> Result<Structure, EngineError> {
    let parse = |lines: &[String]| {
        pdb::parse_records(
            lines,
            &ReadOptions {
                include_hetatm: true,
            },
        )
    };
    let result = match record.complex.as_deref() {
        Some(lines) => parse(lines),
        None => Err(PdbError::MissingRecord("stored complex".into())),
    };
    result.map_err(|source| EngineError::Parse {
        name: name.to_string(),
        source,
    })
}

/// Maps `structure` and moves the grids into `record`. Returns the number of
/// zero-filled channels.
pub(crate) fn map_record(
    engine: &MappingEngine<'_>,
    structure: &Structure,
    record: &mut ConformationRecord,
    feature_names: &[String],
) -> Result<usize, EngineError> {
    let outcome = engine.map(structure, &record.features, feature_names)?;
    outcome.state.advance(MappingState::Stored)?;
    record.grid_points = Some(outcome.axes);
    record.mapped_features = outcome.channels;
    Ok(outcome.failures.len())
}

/// Rasterizes grids for every conformation of an existing collection.
///
/// The feature channels are resolved once against the first conformation, so
/// an unmappable request fails before any record is touched. The collection
/// is rewritten and swapped into place only once every record is processed.
#[instrument(skip_all, name = "map_workflow")]
pub fn run(
    database_path: &Path,
    config: &MappingConfig,
    reporter: &ProgressReporter,
) -> Result<MapSummary, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let mut db = Database::open(database_path)?;
    let engine = MappingEngine::new(config)?;
    let first = match db.names().next() {
        Some(name) => db.get(name)?,
        None => None,
    };
    let first_features = first.map(|record| record.features).unwrap_or_default();
    let feature_names = resolve_feature_names(config.features.as_deref(), &first_features)?;
    info!(
        conformations = db.len(),
        channels = ?feature_names,
        accelerated = engine.uses_accelerator(),
        "Mapping features onto grids"
    );
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Mapping" });
    reporter.report(Progress::TaskStart {
        total_steps: db.len() as u64,
    });
    let mut summary = MapSummary::default();
    db.rewrite(
        |name, mut record| -> Result<Option<ConformationRecord>, EngineError> {
            if record.has_mapping() {
                if !config.reset {
                    summary.already_mapped.push(name.to_string());
                    reporter.report(Progress::TaskIncrement);
                    return Ok(Some(record));
                }
                record.clear_mapping();
            }
            let mapped = stored_complex(name, &record).and_then(|structure| {
                map_record(&engine, &structure, &mut record, &feature_names)
            });
            match mapped {
                Ok(zero_filled) => {
                    summary.zero_filled += zero_filled;
                    summary.mapped.push(name.to_string());
                }
                Err(err) if !err.is_per_conformation() => return Err(err),
                Err(err) => {
                    warn!("{err}; keeping the record without grids");
                    reporter.skipped(name, &err);
                    summary.skipped.push(name.to_string());
                }
            }
            reporter.report(Progress::TaskIncrement);
            Ok(Some(record))
        },
    )?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    info!(
        mapped = summary.mapped.len(),
        already_mapped = summary.already_mapped.len(),
        skipped = summary.skipped.len(),
        zero_filled = summary.zero_filled,
        "Grid mapping finished"
    );
    Ok(summary)
}
