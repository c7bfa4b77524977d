use serde::{Deserialize, Serialize};

const INDEX_BYTES: usize = std::mem::size_of::<u32>();
const VALUE_BYTES: usize = std::mem::size_of::<f32>();

/// Physical storage of a mapped channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelData {
    /// Every cell, in linear index order.
    Dense(Vec<f32>),
    /// Coordinate list of non-negligible cells, indices strictly increasing.
    Sparse { index: Vec<u32>, value: Vec<f32> },
}

/// One rasterized grid channel with its lattice shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedChannel {
    pub shape: [usize; 3],
    pub data: ChannelData,
}

impl MappedChannel {
    pub fn dense(shape: [usize; 3], values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), shape.iter().product::<usize>());
        Self {
            shape,
            data: ChannelData::Dense(values),
        }
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self::dense(shape, vec![0.0; shape.iter().product()])
    }

    pub fn cell_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.data, ChannelData::Sparse { .. })
    }

    /// Bytes taken by the stored values (and indices, when sparse).
    pub fn stored_bytes(&self) -> usize {
        match &self.data {
            ChannelData::Dense(values) => values.len() * VALUE_BYTES,
            ChannelData::Sparse { index, .. } => index.len() * (INDEX_BYTES + VALUE_BYTES),
        }
    }

    pub fn to_dense(&self) -> Vec<f32> {
        match &self.data {
            ChannelData::Dense(values) => values.clone(),
            ChannelData::Sparse { index, value } => {
                let mut out = vec![0.0; self.cell_count()];
                for (&i, &v) in index.iter().zip(value) {
                    out[i as usize] = v;
                }
                out
            }
        }
    }

    pub fn densify(self) -> Self {
        match self.data {
            ChannelData::Dense(_) => self,
            ChannelData::Sparse { .. } => Self::dense(self.shape, self.to_dense()),
        }
    }

    /// Chooses sparse or dense storage.
    ///
    /// Values with `|v| <= threshold` are negligible. The channel is stored
    /// sparse when the coordinate list is strictly smaller than the dense
    /// array, otherwise dense with all values kept.
    pub fn sparsify(self, threshold: f32) -> Self {
        let shape = self.shape;
        let values = match self.data {
            ChannelData::Dense(values) => values,
            ChannelData::Sparse { .. } => self.to_dense(),
        };
        let (index, value): (Vec<u32>, Vec<f32>) = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > threshold)
            .map(|(i, &v)| (i as u32, v))
            .unzip();
        if index.len() * (INDEX_BYTES + VALUE_BYTES) < values.len() * VALUE_BYTES {
            Self {
                shape,
                data: ChannelData::Sparse { index, value },
            }
        } else {
            Self::dense(shape, values)
        }
    }
}
