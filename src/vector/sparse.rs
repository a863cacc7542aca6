//! # Sparse Vectors
//!
//! Compressed storage for gradient directions: sorted, unique coordinate
//! indices with their values.

use crate::error::{Result, SagaError};
use ndarray::Array1;

/// A sparse real vector of fixed dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    dim: usize,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Creates a sparse vector from parallel index/value lists.
    ///
    /// # Arguments
    /// * `dim`: Dimension of the vector.
    /// * `indices`: Strictly increasing coordinate indices, all `< dim`.
    /// * `values`: One value per index.
    pub fn new(dim: usize, indices: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(SagaError::InvalidSparseVector(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        if let Some(&last) = indices.last() {
            if last >= dim {
                return Err(SagaError::IndexOutOfBounds { index: last, len: dim });
            }
        }
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SagaError::InvalidSparseVector(
                "indices must be strictly increasing".into(),
            ));
        }
        Ok(SparseVector { dim, indices, values })
    }

    /// Builds a sparse vector holding the nonzero entries of `dense`.
    pub fn from_dense(dense: &Array1<f64>) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(k, v)| (k, *v))
            .unzip();
        SparseVector {
            dim: dense.len(),
            indices,
            values,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterates over `(index, value)` pairs in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at coordinate `k` (zero when not stored).
    pub fn get(&self, k: usize) -> f64 {
        match self.indices.binary_search(&k) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn to_dense(&self) -> Array1<f64> {
        let mut out = Array1::zeros(self.dim);
        for (k, v) in self.iter() {
            out[k] = v;
        }
        out
    }
}
