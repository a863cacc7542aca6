//! # Vector Module
//!
//! The small amount of vector arithmetic the optimizer needs: dense iterates
//! are plain `ndarray::Array1<f64>`, gradient directions are either dense
//! arrays or [`SparseVector`]s. Both shapes implement [`DirectionVector`].

use ndarray::Array1;

// --- Submodules ---
pub mod ops;
pub mod sparse;

// --- Re-exports ---
pub use sparse::SparseVector;

/// A gradient direction as seen by the gradient cache.
///
/// Implementations only need to support the few kernels the running sum and
/// the iterate updates are built from.
pub trait DirectionVector: Send + Sync {
    /// Length of the vector this direction lives in.
    fn dim(&self) -> usize;

    /// `target += alpha * self`, touching only the nonzero coordinates where possible.
    fn scaled_add_to(&self, alpha: f64, target: &mut Array1<f64>);

    /// Inner product with a dense vector.
    fn dot(&self, x: &Array1<f64>) -> f64;

    /// Returns true if any stored value is NaN.
    fn has_nan(&self) -> bool;
}

impl DirectionVector for Array1<f64> {
    fn dim(&self) -> usize {
        self.len()
    }

    fn scaled_add_to(&self, alpha: f64, target: &mut Array1<f64>) {
        target.scaled_add(alpha, self);
    }

    fn dot(&self, x: &Array1<f64>) -> f64 {
        self.iter().zip(x.iter()).map(|(a, b)| a * b).sum()
    }

    fn has_nan(&self) -> bool {
        self.iter().any(|v| v.is_nan())
    }
}

impl DirectionVector for SparseVector {
    fn dim(&self) -> usize {
        SparseVector::dim(self)
    }

    fn scaled_add_to(&self, alpha: f64, target: &mut Array1<f64>) {
        for (k, v) in self.iter() {
            target[k] += alpha * v;
        }
    }

    fn dot(&self, x: &Array1<f64>) -> f64 {
        self.iter().map(|(k, v)| x[k] * v).sum()
    }

    fn has_nan(&self) -> bool {
        self.values().iter().any(|v| v.is_nan())
    }
}
