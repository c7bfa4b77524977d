use crate::core::store::Database;
use crate::engine::error::EngineError;
use std::path::Path;
use tracing::{info, instrument};

/// Compacts a collection in place, dropping frames superseded by upserts.
///
/// Returns the number of bytes reclaimed.
#[instrument(skip_all, name = "repack_workflow")]
pub fn run(database_path: &Path) -> Result<u64, EngineError> {
    let mut db = Database::open(database_path)?;
    let stale = db.stale_bytes();
    let reclaimed = db.repack()?;
    info!(
        path = %database_path.display(),
        records = db.len(),
        stale,
        reclaimed,
        "Repacked collection"
    );
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::conformation::ConformationRecord;

    #[test]
    fn repack_reclaims_superseded_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.db");
        let mut record = ConformationRecord::default();
        {
            let mut db = Database::create(&path).unwrap();
            for value in 0..4 {
                record.targets.insert("irmsd".into(), f64::from(value));
                db.put("1AK4_7w", &record).unwrap();
            }
        }
        let size = std::fs::metadata(&path).unwrap().len();

        let reclaimed = run(&path).unwrap();
        assert!(reclaimed > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size - reclaimed);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get("1AK4_7w").unwrap().unwrap().targets["irmsd"], 3.0);
    }

    #[test]
    fn missing_collection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("absent.db")).is_err());
    }
}
