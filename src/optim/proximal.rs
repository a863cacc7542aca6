//! # Proximal Operators
//!
//! Closed-form solutions of `argmin_x ½‖x − w‖² + λ·R(x)` for the supported
//! regularizers. Operators are pure: `eval` reads the pre-proximal point and
//! writes the result, with no state besides `lambda`.

use crate::vector::ops;
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use std::fmt::Debug;

/// Base trait for proximal maps.
pub trait ProximalOperator: Debug + Send + Sync {
    fn lambda(&self) -> f64;

    fn set_lambda(&mut self, lambda: f64);

    /// Writes `prox_λ(w)` into `x`. Both views have the same length.
    fn eval(&self, x: ArrayViewMut1<'_, f64>, w: ArrayView1<'_, f64>);
}

/// Soft-thresholding, `x_i = sign(w_i) · max(|w_i| − λ, 0)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct L1Proximal {
    lambda: f64,
}

impl L1Proximal {
    pub fn new(lambda: f64) -> Self {
        L1Proximal { lambda }
    }
}

/// Scalar soft-threshold shared with the lazy engine.
#[inline]
pub(crate) fn soft_threshold(w: f64, lambda: f64) -> f64 {
    if w > lambda {
        w - lambda
    } else if w < -lambda {
        w + lambda
    } else {
        0.0
    }
}

impl ProximalOperator for L1Proximal {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn eval(&self, x: ArrayViewMut1<'_, f64>, w: ArrayView1<'_, f64>) {
        let lambda = self.lambda;
        Zip::from(x).and(w).for_each(|xi, &wi| *xi = soft_threshold(wi, lambda));
    }
}

/// Group shrinkage, `x = max(0, 1 − λ/‖w‖₂) · w`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct L2Proximal {
    lambda: f64,
}

impl L2Proximal {
    pub fn new(lambda: f64) -> Self {
        L2Proximal { lambda }
    }
}

impl ProximalOperator for L2Proximal {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn eval(&self, x: ArrayViewMut1<'_, f64>, w: ArrayView1<'_, f64>) {
        let norm = ops::norm2(w);
        // w = 0 maps to 0 whatever the scale
        let scale = if norm == 0.0 {
            0.0
        } else {
            (1.0 - self.lambda / norm).max(0.0)
        };
        Zip::from(x).and(w).for_each(|xi, &wi| *xi = scale * wi);
    }
}

/// Ridge shrinkage, `x = w / (λ + 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TikhonovProximal {
    lambda: f64,
}

impl TikhonovProximal {
    pub fn new(lambda: f64) -> Self {
        TikhonovProximal { lambda }
    }
}

impl ProximalOperator for TikhonovProximal {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn eval(&self, x: ArrayViewMut1<'_, f64>, w: ArrayView1<'_, f64>) {
        let denom = self.lambda + 1.0;
        Zip::from(x).and(w).for_each(|xi, &wi| *xi = wi / denom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn apply(op: &dyn ProximalOperator, w: &Array1<f64>) -> Array1<f64> {
        let mut x = Array1::zeros(w.len());
        op.eval(x.view_mut(), w.view());
        x
    }

    #[test]
    fn l1_soft_thresholds_each_coordinate() {
        let op = L1Proximal::new(0.5);
        let x = apply(&op, &array![2.0, -0.3, -1.5, 0.5]);
        assert_eq!(x, array![1.5, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn l2_shrinks_whole_vector() {
        let op = L2Proximal::new(1.0);
        let x = apply(&op, &array![3.0, 4.0]);
        assert_abs_diff_eq!(x[0], 2.4, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 3.2, epsilon = 1e-12);
        // below the threshold everything collapses to zero
        let x = apply(&L2Proximal::new(10.0), &array![3.0, 4.0]);
        assert_eq!(x, array![0.0, 0.0]);
        let x = apply(&op, &array![0.0, 0.0]);
        assert_eq!(x, array![0.0, 0.0]);
    }

    #[test]
    fn tikhonov_divides_by_one_plus_lambda() {
        let op = TikhonovProximal::new(1.0);
        assert_eq!(apply(&op, &array![2.0, -4.0]), array![1.0, -2.0]);
    }

    #[test]
    fn lambda_accessors() {
        let mut op = L1Proximal::new(1.0);
        op.set_lambda(0.25);
        assert_eq!(op.lambda(), 0.25);
    }
}
