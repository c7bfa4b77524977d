use crate::core::models::structure::Structure;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

const AXES: [char; 3] = ['x', 'y', 'z'];

/// Contact cutoff (Angstrom) used when centring the lattice on the interface.
pub const DEFAULT_CONTACT_CUTOFF: f64 = 8.5;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum GridSpecError {
    #[error("Grid point count along {axis} must be positive (got {value})")]
    NonPositivePoints { axis: char, value: usize },
    #[error("Grid resolution along {axis} must be positive and finite (got {value})")]
    InvalidResolution { axis: char, value: f64 },
    #[error("Density radius for atom type '{atom_type}' must be positive and finite (got {radius})")]
    InvalidRadius { atom_type: String, radius: f64 },
    #[error("Kernel support radius must be positive and finite (got {0})")]
    InvalidSupport(f64),
    #[error("Sparsify threshold must be finite and non-negative (got {0})")]
    InvalidThreshold(f64),
    #[error("Contact cutoff must be positive and finite (got {0})")]
    InvalidCutoff(f64),
    #[error("Block shape {shape:?} is invalid: every dimension must be >= 1 and the product <= {max}")]
    InvalidBlockShape { shape: [u32; 3], max: u32 },
}

/// Where the lattice sits relative to the molecule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    /// Centred on the mean position of inter-chain contact atoms, or on the
    /// centroid when the structure has no contacts.
    Contact { cutoff: f64 },
    /// Centred on the centroid of all atoms.
    Centroid,
    /// Axes start at the coordinate origin.
    Origin,
    /// Centred on a fixed point.
    Fixed([f64; 3]),
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Contact {
            cutoff: DEFAULT_CONTACT_CUTOFF,
        }
    }
}

impl Anchor {
    pub fn validate(&self) -> Result<(), GridSpecError> {
        match *self {
            Anchor::Contact { cutoff } if !(cutoff.is_finite() && cutoff > 0.0) => {
                Err(GridSpecError::InvalidCutoff(cutoff))
            }
            _ => Ok(()),
        }
    }

    /// The lattice centre for `structure`, or `None` in origin mode.
    pub fn center(&self, structure: &Structure) -> Option<Point3<f64>> {
        match *self {
            Anchor::Contact { cutoff } => Some(
                structure
                    .contact_center(cutoff)
                    .or_else(|| structure.centroid())
                    .unwrap_or_else(Point3::origin),
            ),
            Anchor::Centroid => Some(structure.centroid().unwrap_or_else(Point3::origin)),
            Anchor::Origin => None,
            Anchor::Fixed(p) => Some(Point3::new(p[0], p[1], p[2])),
        }
    }
}

/// Validated lattice dimensions: point counts and spacing per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    points: [usize; 3],
    resolution: [f64; 3],
}

impl GridSpec {
    pub fn new(points: [usize; 3], resolution: [f64; 3]) -> Result<Self, GridSpecError> {
        for (axis, &value) in AXES.iter().zip(&points) {
            if value == 0 {
                return Err(GridSpecError::NonPositivePoints { axis: *axis, value });
            }
        }
        for (axis, &value) in AXES.iter().zip(&resolution) {
            if !(value.is_finite() && value > 0.0) {
                return Err(GridSpecError::InvalidResolution { axis: *axis, value });
            }
        }
        Ok(Self { points, resolution })
    }

    pub fn points(&self) -> [usize; 3] {
        self.points
    }

    pub fn resolution(&self) -> [f64; 3] {
        self.resolution
    }

    pub fn cell_count(&self) -> usize {
        self.points.iter().product()
    }

    pub fn max_resolution(&self) -> f64 {
        self.resolution.iter().copied().fold(f64::MIN, f64::max)
    }

    /// Lays the lattice out around `center`, or from the origin when `center` is `None`.
    pub fn place(&self, center: Option<Point3<f64>>) -> GridAxes {
        let axis = |k: usize| -> Vec<f64> {
            let n = self.points[k];
            let d = self.resolution[k];
            let start = match center {
                Some(c) => c[k] - (n as f64 - 1.0) / 2.0 * d,
                None => 0.0,
            };
            (0..n).map(|i| start + i as f64 * d).collect()
        };
        GridAxes {
            x: axis(0),
            y: axis(1),
            z: axis(2),
        }
    }

    pub fn place_for(&self, structure: &Structure, anchor: &Anchor) -> GridAxes {
        self.place(anchor.center(structure))
    }
}

/// Coordinates of the lattice points along each axis.
///
/// Cell `(i, j, k)` has linear index `(i * ny + j) * nz + k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl GridAxes {
    pub fn shape(&self) -> [usize; 3] {
        [self.x.len(), self.y.len(), self.z.len()]
    }

    pub fn cell_count(&self) -> usize {
        self.x.len() * self.y.len() * self.z.len()
    }

    pub fn axis(&self, k: usize) -> &[f64] {
        match k {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    #[inline]
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.y.len() + j) * self.z.len() + k
    }

    /// Inverse of [`GridAxes::linear_index`].
    #[inline]
    pub fn cell_of(&self, index: usize) -> (usize, usize, usize) {
        let nz = self.z.len();
        let ny = self.y.len();
        (index / (ny * nz), (index / nz) % ny, index % nz)
    }

    #[inline]
    pub fn point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(self.x[i], self.y[j], self.z[k])
    }

    /// Candidate indices along axis `k` whose coordinate may lie in `[lo, hi]`.
    ///
    /// The range is padded by one cell on each side; callers still test each
    /// coordinate exactly. Returns `None` when the interval misses the axis.
    pub fn candidate_range(&self, k: usize, lo: f64, hi: f64) -> Option<RangeInclusive<usize>> {
        let coords = self.axis(k);
        let (first, last) = (*coords.first()?, *coords.last()?);
        if hi < first || lo > last {
            return None;
        }
        if coords.len() == 1 {
            return Some(0..=0);
        }
        let step = (last - first) / (coords.len() - 1) as f64;
        let lo_idx = ((lo - first) / step).floor() - 1.0;
        let hi_idx = ((hi - first) / step).ceil() + 1.0;
        let max = (coords.len() - 1) as f64;
        Some(lo_idx.clamp(0.0, max) as usize..=hi_idx.clamp(0.0, max) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;

    #[test]
    fn rejects_non_positive_dimensions() {
        assert_eq!(
            GridSpec::new([4, 0, 4], [1.0; 3]),
            Err(GridSpecError::NonPositivePoints { axis: 'y', value: 0 })
        );
        assert!(matches!(
            GridSpec::new([4; 3], [1.0, 1.0, -0.5]),
            Err(GridSpecError::InvalidResolution { axis: 'z', .. })
        ));
        assert!(GridSpec::new([4; 3], [f64::NAN, 1.0, 1.0]).is_err());
    }

    #[test]
    fn centred_axes_are_symmetric_about_center() {
        let spec = GridSpec::new([4, 3, 1], [1.0, 0.5, 2.0]).unwrap();
        let axes = spec.place(Some(Point3::new(10.0, 0.0, -1.0)));
        assert_eq!(axes.x, vec![8.5, 9.5, 10.5, 11.5]);
        assert_eq!(axes.y, vec![-0.5, 0.0, 0.5]);
        assert_eq!(axes.z, vec![-1.0]);
        assert_eq!(axes.shape(), [4, 3, 1]);
    }

    #[test]
    fn origin_axes_start_at_zero() {
        let spec = GridSpec::new([3; 3], [2.0; 3]).unwrap();
        let axes = spec.place(None);
        assert_eq!(axes.x, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn linear_index_round_trips() {
        let axes = GridSpec::new([3, 4, 5], [1.0; 3]).unwrap().place(None);
        for index in 0..axes.cell_count() {
            let (i, j, k) = axes.cell_of(index);
            assert_eq!(axes.linear_index(i, j, k), index);
        }
        assert_eq!(axes.linear_index(1, 2, 3), (4 + 2) * 5 + 3);
    }

    #[test]
    fn candidate_range_covers_interval() {
        let axes = GridSpec::new([10, 1, 1], [1.0; 3]).unwrap().place(None);
        let range = axes.candidate_range(0, 2.5, 4.5).unwrap();
        assert!(range.contains(&3) && range.contains(&4));
        assert!(axes.candidate_range(0, 20.0, 30.0).is_none());
        assert_eq!(axes.candidate_range(1, -1.0, 1.0), Some(0..=0));
    }

    #[test]
    fn contact_anchor_falls_back_to_centroid() {
        let structure = Structure::new(vec![
            Atom::new(1, "CA", "ALA", 'A', 1, Point3::new(0.0, 0.0, 0.0)),
            Atom::new(2, "CA", "ALA", 'A', 2, Point3::new(4.0, 0.0, 0.0)),
        ]);
        assert_eq!(
            Anchor::default().center(&structure),
            Some(Point3::new(2.0, 0.0, 0.0))
        );
        assert_eq!(Anchor::Origin.center(&structure), None);
        assert!(Anchor::Contact { cutoff: 0.0 }.validate().is_err());
    }
}
