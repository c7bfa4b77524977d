use super::cpu;
use crate::core::grid::kernel::{Aggregation, GaussianKernel, PointSource};
use crate::core::grid::spec::{GridAxes, GridSpecError};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Upper bound on the logical threads of one block.
pub const MAX_THREADS_PER_BLOCK: u32 = 1024;

/// Number of logical threads per block along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 3]", into = "[u32; 3]")]
pub struct BlockShape {
    dims: [u32; 3],
}

impl BlockShape {
    pub fn new(x: u32, y: u32, z: u32) -> Result<Self, GridSpecError> {
        let dims = [x, y, z];
        let product = dims.iter().map(|&d| u64::from(d)).product::<u64>();
        if dims.contains(&0) || product > u64::from(MAX_THREADS_PER_BLOCK) {
            return Err(GridSpecError::InvalidBlockShape {
                shape: dims,
                max: MAX_THREADS_PER_BLOCK,
            });
        }
        Ok(Self { dims })
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn threads(&self) -> u32 {
        self.dims.iter().product()
    }
}

impl Default for BlockShape {
    fn default() -> Self {
        Self { dims: [8, 8, 8] }
    }
}

impl TryFrom<[u32; 3]> for BlockShape {
    type Error = GridSpecError;

    fn try_from(dims: [u32; 3]) -> Result<Self, Self::Error> {
        Self::new(dims[0], dims[1], dims[2])
    }
}

impl From<BlockShape> for [u32; 3] {
    fn from(shape: BlockShape) -> Self {
        shape.dims
    }
}

impl std::fmt::Display for BlockShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.dims[0], self.dims[1], self.dims[2])
    }
}

impl std::str::FromStr for BlockShape {
    type Err = String;

    /// Parses `XxYxZ`, e.g. `8x8x4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dims = s
            .split(['x', 'X'])
            .map(|d| d.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid block shape '{s}': {e}"))?;
        match dims[..] {
            [x, y, z] => Self::new(x, y, z).map_err(|e| e.to_string()),
            _ => Err(format!("invalid block shape '{s}': expected XxYxZ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceleratorStatus {
    Available { workers: usize },
    Unavailable { reason: String },
}

impl AcceleratorStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, AcceleratorStatus::Available { .. })
    }
}

/// Reports whether the grid-of-blocks executor can run blocks concurrently.
pub fn detect_accelerator() -> AcceleratorStatus {
    #[cfg(feature = "parallel")]
    {
        AcceleratorStatus::Available {
            workers: rayon::current_num_threads(),
        }
    }
    #[cfg(not(feature = "parallel"))]
    {
        AcceleratorStatus::Unavailable {
            reason: "built without the `parallel` feature".into(),
        }
    }
}

/// Grid-of-blocks executor.
///
/// The lattice is tiled into `ceil(n / block)` blocks per axis. Each logical
/// thread owns one cell and gathers the contributions of every point in
/// order, so the result matches [`cpu::rasterize`]. Blocks run concurrently
/// and write to private buffers; the buffers are scattered into the channel
/// only after every block has finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockExecutor {
    block: BlockShape,
}

struct BlockOutput {
    cells: Vec<(usize, f64, u32)>,
}

impl BlockExecutor {
    pub fn new(block: BlockShape) -> Self {
        Self { block }
    }

    pub fn block(&self) -> BlockShape {
        self.block
    }

    /// Number of blocks along each axis.
    pub fn grid_dims(&self, axes: &GridAxes) -> [usize; 3] {
        let shape = axes.shape();
        let mut dims = [0; 3];
        for k in 0..3 {
            dims[k] = shape[k].div_ceil(self.block.dims[k] as usize);
        }
        dims
    }

    pub fn rasterize(
        &self,
        axes: &GridAxes,
        kernel: &GaussianKernel,
        source: &PointSource,
        aggregation: Aggregation,
    ) -> Vec<f32> {
        let grid = self.grid_dims(axes);
        let block_count = grid[0] * grid[1] * grid[2];

        let run = |block_id: usize| self.run_block(block_id, grid, axes, kernel, source);

        #[cfg(feature = "parallel")]
        let outputs: Vec<BlockOutput> = (0..block_count).into_par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let outputs: Vec<BlockOutput> = (0..block_count).map(run).collect();

        let n = axes.cell_count();
        let mut sums = vec![0.0f64; n];
        let mut counts = vec![0u32; n];
        for output in outputs {
            for (idx, sum, count) in output.cells {
                sums[idx] = sum;
                counts[idx] = count;
            }
        }
        cpu::finish(sums, &counts, aggregation)
    }

    fn run_block(
        &self,
        block_id: usize,
        grid: [usize; 3],
        axes: &GridAxes,
        kernel: &GaussianKernel,
        source: &PointSource,
    ) -> BlockOutput {
        let shape = axes.shape();
        let block = self.block.dims.map(|d| d as usize);
        let coords = [
            block_id / (grid[1] * grid[2]),
            (block_id / grid[2]) % grid[1],
            block_id % grid[2],
        ];
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for k in 0..3 {
            lo[k] = coords[k] * block[k];
            hi[k] = (lo[k] + block[k]).min(shape[k]);
        }

        // Points whose support can reach the block, kept in source order.
        let support = kernel.support();
        let block_min = axes.point(lo[0], lo[1], lo[2]);
        let block_max = axes.point(hi[0] - 1, hi[1] - 1, hi[2] - 1);
        let nearby: Vec<(&Point3<f64>, f64)> = source
            .positions
            .iter()
            .zip(source.weights.iter().copied())
            .filter(|(p, _)| {
                (0..3).all(|k| p[k] + support >= block_min[k] && p[k] - support <= block_max[k])
            })
            .collect();

        let mut cells = Vec::with_capacity(block.iter().product());
        for i in lo[0]..hi[0] {
            for j in lo[1]..hi[1] {
                for k in lo[2]..hi[2] {
                    let cell = axes.point(i, j, k);
                    let mut sum = 0.0f64;
                    let mut count = 0u32;
                    for &(position, weight) in &nearby {
                        if let Some(value) = kernel.contribution(&cell, position) {
                            sum += weight * value;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        cells.push((axes.linear_index(i, j, k), sum, count));
                    }
                }
            }
        }
        BlockOutput { cells }
    }
}

#[derive(Debug, Clone)]
pub struct TuneReport {
    pub timings: Vec<(BlockShape, Duration)>,
    pub best: BlockShape,
}

/// Times every candidate block shape on a synthetic workload and reports the fastest.
///
/// The workload is `atoms` random points inside a `points`-per-axis lattice of
/// unit spacing, drawn from a fixed seed so repeated runs are comparable.
pub fn tune(
    candidates: &[BlockShape],
    points: usize,
    atoms: usize,
    repeats: usize,
) -> Option<TuneReport> {
    if candidates.is_empty() || points == 0 {
        return None;
    }
    let axes = GridAxes {
        x: (0..points).map(|i| i as f64).collect(),
        y: (0..points).map(|i| i as f64).collect(),
        z: (0..points).map(|i| i as f64).collect(),
    };
    let extent = (points - 1) as f64;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let positions = (0..atoms)
        .map(|_| {
            Point3::new(
                rng.gen_range(0.0..=extent),
                rng.gen_range(0.0..=extent),
                rng.gen_range(0.0..=extent),
            )
        })
        .collect();
    let source = PointSource::unit(positions);
    let kernel = GaussianKernel::density("C", 1.7).ok()?;

    let mut timings = Vec::with_capacity(candidates.len());
    for &shape in candidates {
        let executor = BlockExecutor::new(shape);
        let start = Instant::now();
        for _ in 0..repeats.max(1) {
            std::hint::black_box(executor.rasterize(&axes, &kernel, &source, Aggregation::Sum));
        }
        let elapsed = start.elapsed() / repeats.max(1) as u32;
        debug!(block = %shape, ?elapsed, "Timed block shape");
        timings.push((shape, elapsed));
    }

    let best = timings.iter().min_by_key(|(_, t)| *t).map(|(s, _)| *s)?;
    info!(block = %best, "Fastest block shape");
    Some(TuneReport { timings, best })
}
