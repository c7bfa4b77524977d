use super::spec::GridSpecError;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// How contributions of several atoms to one cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    /// Sum divided by the number of atoms contributing to the cell.
    Average,
}

/// An isotropic Gaussian `exp(-d^2 / (2 sigma^2))` truncated to a cubic support.
///
/// A point contributes to a cell only when every axis offset is within
/// `support`. Both execution paths use [`GaussianKernel::contribution`], so
/// they agree on the support test and the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    inv_two_sigma_sq: f64,
    support: f64,
}

impl GaussianKernel {
    pub fn new(sigma: f64, support: f64) -> Result<Self, GridSpecError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(GridSpecError::InvalidSupport(sigma));
        }
        if !(support.is_finite() && support > 0.0) {
            return Err(GridSpecError::InvalidSupport(support));
        }
        Ok(Self {
            inv_two_sigma_sq: 1.0 / (2.0 * sigma * sigma),
            support,
        })
    }

    /// Atomic density kernel: `sigma = radius / 2`, support `1.5 * radius`.
    pub fn density(atom_type: &str, radius: f64) -> Result<Self, GridSpecError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(GridSpecError::InvalidRadius {
                atom_type: atom_type.to_string(),
                radius,
            });
        }
        Self::new(radius / 2.0, 1.5 * radius)
    }

    /// Feature smearing kernel: `sigma^2 = max_resolution / 2`, support `3 sigma` unless given.
    pub fn feature(max_resolution: f64, support: Option<f64>) -> Result<Self, GridSpecError> {
        let sigma = (max_resolution / 2.0).sqrt();
        Self::new(sigma, support.unwrap_or(3.0 * sigma))
    }

    pub fn support(&self) -> f64 {
        self.support
    }

    #[inline]
    pub fn value(&self, distance_sq: f64) -> f64 {
        (-distance_sq * self.inv_two_sigma_sq).exp()
    }

    /// Kernel value at `cell` for a point at `center`, `None` outside the support.
    #[inline]
    pub fn contribution(&self, cell: &Point3<f64>, center: &Point3<f64>) -> Option<f64> {
        let delta = cell - center;
        if delta.x.abs() > self.support || delta.y.abs() > self.support || delta.z.abs() > self.support
        {
            return None;
        }
        Some(self.value(delta.norm_squared()))
    }
}

/// Weighted points rasterized into a single channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSource {
    pub positions: Vec<Point3<f64>>,
    pub weights: Vec<f64>,
}

impl PointSource {
    /// Unit-weight points, as used by atomic densities.
    pub fn unit(positions: Vec<Point3<f64>>) -> Self {
        let weights = vec![1.0; positions.len()];
        Self { positions, weights }
    }

    pub fn weighted(positions: Vec<Point3<f64>>, weights: Vec<f64>) -> Self {
        Self { positions, weights }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions and weights have equal length and every value is finite.
    pub fn is_well_formed(&self) -> bool {
        self.positions.len() == self.weights.len()
            && self.weights.iter().all(|w| w.is_finite())
            && self.positions.iter().all(|p| p.coords.iter().all(|c| c.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_kernel_uses_half_radius_sigma() {
        let kernel = GaussianKernel::density("C", 2.0).unwrap();
        assert_eq!(kernel.support(), 3.0);
        // sigma = 1, so value(1) = exp(-0.5)
        assert!((kernel.value(1.0) - (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(kernel.value(0.0), 1.0);
    }

    #[test]
    fn feature_kernel_matches_beta_form() {
        let max_res = 1.0;
        let kernel = GaussianKernel::feature(max_res, None).unwrap();
        let beta = 1.0 / max_res;
        for d_sq in [0.0, 0.25, 1.0, 2.0] {
            assert!((kernel.value(d_sq) - (-beta * d_sq).exp()).abs() < 1e-12);
        }
        assert!((kernel.support() - 3.0 * 0.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(GaussianKernel::feature(1.0, Some(5.0)).unwrap().support(), 5.0);
    }

    #[test]
    fn contribution_is_cut_at_cubic_support() {
        let kernel = GaussianKernel::density("N", 1.0).unwrap();
        let center = Point3::origin();
        assert!(kernel.contribution(&Point3::new(1.5, 1.5, 1.5), &center).is_some());
        assert!(kernel.contribution(&Point3::new(1.6, 0.0, 0.0), &center).is_none());
    }

    #[test]
    fn rejects_invalid_radius() {
        assert!(matches!(
            GaussianKernel::density("S", 0.0),
            Err(GridSpecError::InvalidRadius { .. })
        ));
        assert!(GaussianKernel::feature(1.0, Some(-1.0)).is_err());
    }

    #[test]
    fn well_formedness_checks_lengths_and_finiteness() {
        let ok = PointSource::weighted(vec![Point3::origin()], vec![1.0]);
        assert!(ok.is_well_formed());
        let short = PointSource::weighted(vec![Point3::origin()], vec![]);
        assert!(!short.is_well_formed());
        let nan = PointSource::weighted(vec![Point3::new(f64::NAN, 0.0, 0.0)], vec![1.0]);
        assert!(!nan.is_well_formed());
    }
}
