//! Built-in feature and target modules.
//!
//! These read values straight from the structure records or from a lookup
//! table. They carry no chemical meaning of their own and exist so a
//! database can be built end to end without external modules.

use crate::core::models::conformation::FeatureData;
use crate::core::models::structure::Structure;
use crate::core::utils::identifiers::is_native_name;
use crate::engine::features::{FeatureError, FeatureModule, TargetContext, TargetModule};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

pub struct OccupancyFeature;

impl FeatureModule for OccupancyFeature {
    fn name(&self) -> &str {
        "occupancy"
    }

    fn compute(&self, structure: &Structure) -> Result<BTreeMap<String, FeatureData>, FeatureError> {
        let values = structure.atoms().iter().map(|a| a.occupancy).collect();
        Ok(BTreeMap::from([(
            self.name().to_string(),
            FeatureData::PerAtom(values),
        )]))
    }
}

pub struct TemperatureFactorFeature;

impl FeatureModule for TemperatureFactorFeature {
    fn name(&self) -> &str {
        "temperature_factor"
    }

    fn compute(&self, structure: &Structure) -> Result<BTreeMap<String, FeatureData>, FeatureError> {
        let values = structure
            .atoms()
            .iter()
            .map(|a| a.temperature_factor)
            .collect();
        Ok(BTreeMap::from([(
            self.name().to_string(),
            FeatureData::PerAtom(values),
        )]))
    }
}

/// `1` for native conformations, `0` for decoys.
pub struct BinaryClassTarget;

impl TargetModule for BinaryClassTarget {
    fn name(&self) -> &str {
        "binary_class"
    }

    fn compute(&self, ctx: &TargetContext<'_>) -> Result<BTreeMap<String, f64>, FeatureError> {
        let class = if is_native_name(ctx.name) { 1.0 } else { 0.0 };
        Ok(BTreeMap::from([(self.name().to_string(), class)]))
    }
}

/// Conformation name to value lookup loaded from a delimited text table.
///
/// Each row is `<conformation> ... <value>`: the first column is the key and
/// the last column the value. Commas, tabs or runs of spaces separate
/// columns; rows whose last column is not a number (headers) are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableTargets {
    values: HashMap<String, f64>,
}

impl TableTargets {
    pub fn parse(text: &str) -> Result<Self, csv::Error> {
        let delimiter = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|line| {
                if line.contains(',') {
                    b','
                } else if line.contains('\t') {
                    b'\t'
                } else {
                    b' '
                }
            })
            .unwrap_or(b',');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut values = HashMap::new();
        for result in reader.records() {
            let record = result?;
            let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
            let (Some(key), Some(last)) = (fields.first(), fields.last()) else {
                continue;
            };
            if fields.len() < 2 {
                continue;
            }
            match last.parse::<f64>() {
                Ok(value) => {
                    values.insert(key.to_string(), value);
                }
                Err(_) => debug!(row = ?fields, "Skipping non-numeric table row"),
            }
        }
        Ok(Self { values })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, FeatureError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| FeatureError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&text).map_err(|e| FeatureError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A target read from a [`TableTargets`] lookup, stored under `name`.
pub struct TableTarget {
    name: String,
    table: TableTargets,
}

impl TableTarget {
    pub fn new(name: &str, table: TableTargets) -> Self {
        Self {
            name: name.to_string(),
            table,
        }
    }

    pub fn from_path<P: AsRef<Path>>(name: &str, path: P) -> Result<Self, FeatureError> {
        Ok(Self::new(name, TableTargets::from_path(path)?))
    }
}

impl TargetModule for TableTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, ctx: &TargetContext<'_>) -> Result<BTreeMap<String, f64>, FeatureError> {
        let value = self.table.get(ctx.name).ok_or_else(|| FeatureError::Compute {
            module: self.name.clone(),
            reason: format!("no table entry for '{}'", ctx.name),
        })?;
        Ok(BTreeMap::from([(self.name.clone(), value)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use nalgebra::Point3;

    fn structure() -> Structure {
        let mut a = Atom::new(1, "N", "ALA", 'A', 1, Point3::origin());
        a.occupancy = 0.5;
        a.temperature_factor = 12.0;
        let b = Atom::new(2, "CA", "ALA", 'A', 1, Point3::origin());
        Structure::new(vec![a, b])
    }

    fn ctx<'a>(name: &'a str, s: &'a Structure, f: &'a BTreeMap<String, FeatureData>) -> TargetContext<'a> {
        TargetContext {
            name,
            complex: s,
            native: None,
            features: f,
        }
    }

    #[test]
    fn record_features_follow_atom_order() {
        let s = structure();
        let occ = OccupancyFeature.compute(&s).unwrap();
        assert_eq!(occ["occupancy"], FeatureData::PerAtom(vec![0.5, 1.0]));
        let temp = TemperatureFactorFeature.compute(&s).unwrap();
        assert_eq!(temp["temperature_factor"], FeatureData::PerAtom(vec![12.0, 0.0]));
    }

    #[test]
    fn binary_class_marks_natives() {
        let s = structure();
        let f = BTreeMap::new();
        assert_eq!(BinaryClassTarget.compute(&ctx("1AK4", &s, &f)).unwrap()["binary_class"], 1.0);
        assert_eq!(BinaryClassTarget.compute(&ctx("1AK4_7w", &s, &f)).unwrap()["binary_class"], 0.0);
    }

    #[test]
    fn table_accepts_whitespace_and_csv_layouts() {
        let spaced = TableTargets::parse("# model fnat irmsd\n1AK4_7w   0.31   4.25\n1AK4_10w 0.0 12.5\n").unwrap();
        assert_eq!(spaced.get("1AK4_7w"), Some(4.25));
        assert_eq!(spaced.get("1AK4_10w"), Some(12.5));

        let csv = TableTargets::parse("name,fnat,irmsd\n1AK4_7w,0.31,4.25\n").unwrap();
        assert_eq!(csv.len(), 1);
        assert_eq!(csv.get("1AK4_7w"), Some(4.25));

        let tabbed = TableTargets::parse("1ATN_3w\t7.5\n").unwrap();
        assert_eq!(tabbed.get("1ATN_3w"), Some(7.5));
    }

    #[test]
    fn table_target_reports_missing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irmsd.dat");
        std::fs::write(&path, "1AK4_7w 4.25\n").unwrap();
        let target = TableTarget::from_path("irmsd", &path).unwrap();

        let s = structure();
        let f = BTreeMap::new();
        assert_eq!(target.compute(&ctx("1AK4_7w", &s, &f)).unwrap()["irmsd"], 4.25);
        assert!(matches!(
            target.compute(&ctx("2OUL_1w", &s, &f)),
            Err(FeatureError::Compute { .. })
        ));
        assert!(TableTarget::from_path("irmsd", dir.path().join("none")).is_err());
    }
}
