use crate::core::models::conformation::ConformationRecord;
use crate::core::store::Database;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::Path;
use tracing::{info, instrument};

/// The record members a remove phase drops.
///
/// The default drops everything except the mapped grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveSelection {
    pub features: bool,
    /// `complex` and `native`; only dropped from records holding both.
    pub structures: bool,
    pub grid_points: bool,
    pub mapped_features: bool,
}

impl Default for RemoveSelection {
    fn default() -> Self {
        Self {
            features: true,
            structures: true,
            grid_points: true,
            mapped_features: false,
        }
    }
}

impl RemoveSelection {
    pub fn is_empty(&self) -> bool {
        !(self.features || self.structures || self.grid_points || self.mapped_features)
    }

    fn apply(&self, record: &mut ConformationRecord) -> bool {
        let mut changed = false;
        if self.features && !record.features.is_empty() {
            record.features.clear();
            changed = true;
        }
        if self.structures && record.complex.is_some() && record.native.is_some() {
            record.complex = None;
            record.native = None;
            changed = true;
        }
        if self.grid_points && record.grid_points.take().is_some() {
            changed = true;
        }
        if self.mapped_features && !record.mapped_features.is_empty() {
            record.mapped_features.clear();
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveSummary {
    /// Records that lost at least one member.
    pub modified: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Drops the selected members from every record, then compacts the collection.
///
/// The compacted collection replaces the original only once it is complete,
/// so an interrupted run leaves the original intact.
#[instrument(skip_all, name = "remove_workflow")]
pub fn run(
    database_path: &Path,
    selection: &RemoveSelection,
    reporter: &ProgressReporter,
) -> Result<RemoveSummary, EngineError> {
    let mut db = Database::open(database_path)?;
    let bytes_before = std::fs::metadata(database_path)?.len();

    reporter.report(Progress::PhaseStart { name: "Remove" });
    reporter.report(Progress::TaskStart {
        total_steps: db.len() as u64,
    });
    let mut modified = 0usize;
    db.rewrite(|_, mut record| -> Result<Option<ConformationRecord>, EngineError> {
        if selection.apply(&mut record) {
            modified += 1;
        }
        reporter.report(Progress::TaskIncrement);
        Ok(Some(record))
    })?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let bytes_after = std::fs::metadata(database_path)?.len();
    info!(
        ?selection,
        modified, bytes_before, bytes_after, "Removed members and compacted collection"
    );
    Ok(RemoveSummary {
        modified,
        bytes_before,
        bytes_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::channel::MappedChannel;
    use crate::core::grid::spec::GridAxes;
    use crate::core::models::conformation::FeatureData;

    fn record(with_native: bool) -> ConformationRecord {
        let line = "ATOM      1  N   ALA A   1       0.000   0.000   0.000  1.00  0.00".to_string();
        let mut record = ConformationRecord {
            complex: Some(vec![line.clone(); 64]),
            native: with_native.then(|| vec![line; 64]),
            grid_points: Some(GridAxes {
                x: vec![0.0, 1.0],
                y: vec![0.0, 1.0],
                z: vec![0.0, 1.0],
            }),
            ..Default::default()
        };
        record
            .features
            .insert("charge".into(), FeatureData::PerAtom(vec![0.25; 64]));
        record.targets.insert("irmsd".into(), 2.0);
        record
            .mapped_features
            .insert("C_chainA".into(), MappedChannel::dense([2, 2, 2], vec![1.0; 8]));
        record
    }

    fn collection(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("train.db");
        let mut db = Database::create(&path).unwrap();
        db.put("1AK4", &record(true)).unwrap();
        db.put("1AK4_7w", &record(true)).unwrap();
        db.put("2OUL_1w", &record(false)).unwrap();
        path
    }

    #[test]
    fn default_selection_keeps_grids_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = collection(dir.path());

        let summary = run(&path, &RemoveSelection::default(), &ProgressReporter::new()).unwrap();
        assert_eq!(summary.modified, 3);
        assert!(summary.bytes_after < summary.bytes_before);

        let db = Database::open(&path).unwrap();
        let paired = db.get("1AK4_7w").unwrap().unwrap();
        assert!(paired.features.is_empty());
        assert!(paired.complex.is_none() && paired.native.is_none());
        assert!(paired.grid_points.is_none());
        assert_eq!(paired.targets["irmsd"], 2.0);
        assert!(paired.mapped_features.contains_key("C_chainA"));

        // no native, so the complex stays
        let lone = db.get("2OUL_1w").unwrap().unwrap();
        assert!(lone.complex.is_some());
    }

    #[test]
    fn removing_mapped_grids_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = collection(dir.path());
        let selection = RemoveSelection {
            features: false,
            structures: false,
            grid_points: true,
            mapped_features: true,
        };
        run(&path, &selection, &ProgressReporter::new()).unwrap();

        let db = Database::open(&path).unwrap();
        let record = db.get("1AK4").unwrap().unwrap();
        assert!(!record.has_mapping());
        assert!(record.features.contains_key("charge"));
        assert!(record.complex.is_some());
        assert_eq!(db.stale_bytes(), 0);
    }

    #[test]
    fn empty_selection_only_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = collection(dir.path());
        {
            let mut db = Database::open(&path).unwrap();
            db.put("1AK4", &record(true)).unwrap();
            assert!(db.stale_bytes() > 0);
        }
        let selection = RemoveSelection {
            features: false,
            structures: false,
            grid_points: false,
            mapped_features: false,
        };
        assert!(selection.is_empty());
        let summary = run(&path, &selection, &ProgressReporter::new()).unwrap();
        assert_eq!(summary.modified, 0);
        assert!(summary.bytes_after < summary.bytes_before);
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("1AK4").unwrap().unwrap(), record(true));
    }
}
