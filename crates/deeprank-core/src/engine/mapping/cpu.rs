use crate::core::grid::kernel::{Aggregation, GaussianKernel, PointSource};
use crate::core::grid::spec::GridAxes;

/// Scatters every point over the cells inside its kernel support.
///
/// Contributions to a cell are accumulated in point order, the same order the
/// block executor gathers them in.
pub fn rasterize(
    axes: &GridAxes,
    kernel: &GaussianKernel,
    source: &PointSource,
    aggregation: Aggregation,
) -> Vec<f32> {
    let n = axes.cell_count();
    let mut sums = vec![0.0f64; n];
    let mut counts = vec![0u32; n];
    let support = kernel.support();

    for (position, &weight) in source.positions.iter().zip(&source.weights) {
        let ranges = (
            axes.candidate_range(0, position.x - support, position.x + support),
            axes.candidate_range(1, position.y - support, position.y + support),
            axes.candidate_range(2, position.z - support, position.z + support),
        );
        let (Some(ri), Some(rj), Some(rk)) = ranges else {
            continue;
        };
        for i in ri {
            for j in rj.clone() {
                for k in rk.clone() {
                    let cell = axes.point(i, j, k);
                    if let Some(value) = kernel.contribution(&cell, position) {
                        let idx = axes.linear_index(i, j, k);
                        sums[idx] += weight * value;
                        counts[idx] += 1;
                    }
                }
            }
        }
    }

    finish(sums, &counts, aggregation)
}

pub(super) fn finish(sums: Vec<f64>, counts: &[u32], aggregation: Aggregation) -> Vec<f32> {
    sums.into_iter()
        .zip(counts)
        .map(|(sum, &count)| match aggregation {
            Aggregation::Sum => sum as f32,
            Aggregation::Average if count > 0 => (sum / f64::from(count)) as f32,
            Aggregation::Average => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::spec::GridSpec;
    use nalgebra::Point3;

    fn axes() -> GridAxes {
        GridSpec::new([5, 5, 5], [1.0; 3]).unwrap().place(Some(Point3::origin()))
    }

    #[test]
    fn single_atom_peaks_at_its_cell() {
        let axes = axes();
        let kernel = GaussianKernel::density("C", 1.7).unwrap();
        let grid = rasterize(&axes, &kernel, &PointSource::unit(vec![Point3::origin()]), Aggregation::Sum);

        let centre = axes.linear_index(2, 2, 2);
        assert_eq!(grid[centre], 1.0);
        let neighbour = axes.linear_index(3, 2, 2);
        let expected = kernel.value(1.0) as f32;
        assert_eq!(grid[neighbour], expected);
        // 1.5 * 1.7 = 2.55, so the lattice corner at distance 2 per axis is inside
        assert!(grid[axes.linear_index(0, 0, 0)] > 0.0);
    }

    #[test]
    fn cells_outside_support_stay_zero() {
        let axes = axes();
        let kernel = GaussianKernel::density("N", 0.5).unwrap();
        let grid = rasterize(&axes, &kernel, &PointSource::unit(vec![Point3::origin()]), Aggregation::Sum);
        let nonzero = grid.iter().filter(|v| **v != 0.0).count();
        assert_eq!(nonzero, 1);
    }

    #[test]
    fn average_divides_by_contributing_atoms() {
        let axes = axes();
        let kernel = GaussianKernel::feature(1.0, Some(0.1)).unwrap();
        let source = PointSource::weighted(vec![Point3::origin(), Point3::origin()], vec![2.0, 4.0]);

        let sum = rasterize(&axes, &kernel, &source, Aggregation::Sum);
        let avg = rasterize(&axes, &kernel, &source, Aggregation::Average);
        let centre = axes.linear_index(2, 2, 2);
        assert_eq!(sum[centre], 6.0);
        assert_eq!(avg[centre], 3.0);
        assert_eq!(avg[axes.linear_index(0, 0, 0)], 0.0);
    }

    #[test]
    fn points_far_outside_the_lattice_are_ignored() {
        let axes = axes();
        let kernel = GaussianKernel::density("C", 1.7).unwrap();
        let grid = rasterize(
            &axes,
            &kernel,
            &PointSource::unit(vec![Point3::new(100.0, 0.0, 0.0)]),
            Aggregation::Sum,
        );
        assert!(grid.iter().all(|v| *v == 0.0));
    }
}
