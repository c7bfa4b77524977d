use crate::core::grid::channel::MappedChannel;
use crate::core::grid::spec::GridAxes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric output of a feature module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureData {
    /// One value for the whole conformation.
    Scalar(f64),
    /// One value per atom of `complex`, index-aligned with the atom records.
    PerAtom(Vec<f64>),
    /// One value per residue of `complex`, in order of appearance.
    PerResidue(Vec<f64>),
}

impl FeatureData {
    pub fn is_per_atom(&self) -> bool {
        matches!(self, FeatureData::PerAtom(_))
    }

    pub fn as_per_atom(&self) -> Option<&[f64]> {
        match self {
            FeatureData::PerAtom(values) => Some(values),
            _ => None,
        }
    }
}

/// The rigid rotation that produced an augmentation replica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    /// Unit rotation axis through the coordinate origin.
    pub axis: [f64; 3],
    /// Rotation angle in radians, in `(-pi, pi)`.
    pub angle: f64,
}

/// One conformation group of the persisted collection.
///
/// `complex` and `native` hold the fixed-column atom records verbatim, so a
/// consumer can re-parse them with the structure reader. Replica groups carry
/// their own rotated `complex` and grids but copies of the origin's
/// `features` and `targets`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConformationRecord {
    pub complex: Option<Vec<String>>,
    pub native: Option<Vec<String>>,
    pub features: BTreeMap<String, FeatureData>,
    pub targets: BTreeMap<String, f64>,
    pub grid_points: Option<GridAxes>,
    pub mapped_features: BTreeMap<String, MappedChannel>,
    pub augmentation: Option<Augmentation>,
}

impl ConformationRecord {
    pub fn has_mapping(&self) -> bool {
        self.grid_points.is_some() || !self.mapped_features.is_empty()
    }

    /// Drops every grid-derived member.
    pub fn clear_mapping(&mut self) {
        self.grid_points = None;
        self.mapped_features.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_feature_maps_are_independent() {
        let mut origin = ConformationRecord::default();
        origin
            .features
            .insert("charge".into(), FeatureData::PerAtom(vec![0.1, 0.2]));

        let mut replica = origin.clone();
        if let Some(FeatureData::PerAtom(values)) = replica.features.get_mut("charge") {
            values[0] = 9.0;
        }

        assert_eq!(
            origin.features["charge"],
            FeatureData::PerAtom(vec![0.1, 0.2])
        );
        assert_eq!(
            replica.features["charge"],
            FeatureData::PerAtom(vec![9.0, 0.2])
        );
    }

    #[test]
    fn clear_mapping_removes_points_and_channels() {
        let mut record = ConformationRecord {
            grid_points: Some(GridAxes {
                x: vec![0.0],
                y: vec![0.0],
                z: vec![0.0],
            }),
            ..Default::default()
        };
        assert!(record.has_mapping());
        record.clear_mapping();
        assert!(!record.has_mapping());
    }

    #[test]
    fn per_atom_accessor_rejects_other_shapes() {
        assert!(FeatureData::Scalar(1.0).as_per_atom().is_none());
        assert!(FeatureData::PerResidue(vec![1.0]).as_per_atom().is_none());
        assert_eq!(
            FeatureData::PerAtom(vec![1.0]).as_per_atom(),
            Some([1.0].as_slice())
        );
    }
}
