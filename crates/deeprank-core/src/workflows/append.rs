use super::create::Attachments;
use super::map::stored_complex;
use crate::core::io::pdb::{self, ReadOptions};
use crate::core::models::conformation::{ConformationRecord, FeatureData};
use crate::core::models::structure::Structure;
use crate::core::store::Database;
use crate::core::utils::identifiers::split_replica;
use crate::engine::config::AppendConfig;
use crate::engine::error::EngineError;
use crate::engine::features::{ImportSources, ModuleRegistry, TargetContext};
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument, warn};

/// Which member of the records an append phase upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendKind {
    Features,
    Targets,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendSummary {
    /// Origin records whose blocks were recomputed or imported.
    pub updated: Vec<String>,
    /// Replica records refreshed by copy from their origin.
    pub copied: Vec<String>,
    /// Records left unchanged, with a warning.
    pub skipped: Vec<String>,
}

#[derive(Default)]
struct Blocks {
    features: BTreeMap<String, FeatureData>,
    targets: BTreeMap<String, f64>,
}

fn stored_native(record: &ConformationRecord) -> Option<Structure> {
    let lines = record.native.as_deref()?;
    pdb::parse_records(
        lines,
        &ReadOptions {
            include_hetatm: true,
        },
    )
    .ok()
}

/// Upserts features into every origin record of an existing collection.
pub fn add_features(
    registry: &ModuleRegistry,
    config: &AppendConfig,
    reporter: &ProgressReporter,
) -> Result<AppendSummary, EngineError> {
    run(AppendKind::Features, registry, config, reporter)
}

/// Upserts targets into every origin record of an existing collection.
pub fn add_targets(
    registry: &ModuleRegistry,
    config: &AppendConfig,
    reporter: &ProgressReporter,
) -> Result<AppendSummary, EngineError> {
    run(AppendKind::Targets, registry, config, reporter)
}

/// Shared body of the append phases.
///
/// Existing blocks of the same name are replaced, others are kept, so
/// running a phase twice leaves the collection as after the first run.
/// Records are visited in name order, which puts every origin before its
/// `_r<k>` replicas; a replica receives a fresh copy of its origin's updated
/// blocks and is never recomputed.
#[instrument(skip_all, name = "append_workflow", fields(kind = ?kind))]
pub fn run(
    kind: AppendKind,
    registry: &ModuleRegistry,
    config: &AppendConfig,
    reporter: &ProgressReporter,
) -> Result<AppendSummary, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let none: &[String] = &[];
    let (features, targets) = match kind {
        AppendKind::Features => (config.modules.as_slice(), none),
        AppendKind::Targets => (none, config.modules.as_slice()),
    };
    registry.validate(features, targets)?;
    let attachments = Attachments {
        registry,
        imports: ImportSources::open(&config.import_from)?,
        features,
        targets,
    };
    let mut db = Database::open(&config.database_path)?;
    info!(
        path = %config.database_path.display(),
        records = db.len(),
        modules = ?config.modules,
        "Appending to collection"
    );
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Append" });
    reporter.report(Progress::TaskStart {
        total_steps: db.len() as u64,
    });
    let mut summary = AppendSummary::default();
    let mut origins: HashMap<String, Blocks> = HashMap::new();
    db.rewrite(
        |name, mut record| -> Result<Option<ConformationRecord>, EngineError> {
            if let Some((origin, _)) = split_replica(name) {
                match origins.get(origin) {
                    Some(blocks) => {
                        match kind {
                            AppendKind::Features => record.features = blocks.features.clone(),
                            AppendKind::Targets => record.targets = blocks.targets.clone(),
                        }
                        summary.copied.push(name.to_string());
                    }
                    None => {
                        warn!(replica = name, origin, "Origin record missing; replica left unchanged");
                        summary.skipped.push(name.to_string());
                    }
                }
                reporter.report(Progress::TaskIncrement);
                return Ok(Some(record));
            }

            match stored_complex(name, &record) {
                Ok(complex) => {
                    match kind {
                        AppendKind::Features => {
                            let blocks = attachments.features(name, &complex)?;
                            record.features.extend(blocks);
                        }
                        AppendKind::Targets => {
                            let native = stored_native(&record);
                            let blocks = attachments.targets(&TargetContext {
                                name,
                                complex: &complex,
                                native: native.as_ref(),
                                features: &record.features,
                            })?;
                            record.targets.extend(blocks);
                        }
                    }
                    summary.updated.push(name.to_string());
                }
                Err(err) => {
                    warn!("{err}; record left unchanged");
                    reporter.skipped(name, &err);
                    summary.skipped.push(name.to_string());
                }
            }
            origins.insert(
                name.to_string(),
                Blocks {
                    features: record.features.clone(),
                    targets: record.targets.clone(),
                },
            );
            reporter.report(Progress::TaskIncrement);
            Ok(Some(record))
        },
    )?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    info!(
        updated = summary.updated.len(),
        copied = summary.copied.len(),
        skipped = summary.skipped.len(),
        "Append finished"
    );
    Ok(summary)
}
