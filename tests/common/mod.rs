//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsaga::objective::LogisticRegression;
use rsaga::SparseVector;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SIZE: [f64; 20] = [1., 4., 1., 8., 1., 10., 1., 1., 1., 2., 1., 1., 3., 1., 7., 4., 1., 1., 7., 1.];
const SHAPE: [f64; 20] = [1., 4., 1., 8., 1., 10., 1., 2., 1., 1., 1., 1., 3., 1., 5., 6., 1., 1., 7., 1.];
const CLASS: [f64; 20] = [0., 0., 0., 0., 0., 1., 0., 0., 0., 0., 0., 0., 1., 0., 1., 1., 0., 0., 1., 0.];

/// Unregularized maximum-likelihood estimate on the 20-sample fixture.
pub const FIXTURE_OPTIMUM: [f64; 3] = [-3.549076, 0.184090, 0.506700];
/// Optimum with `l1 = 0.4`.
pub const FIXTURE_L1_OPTIMUM: [f64; 3] = [-2.865813, 0.151993, 0.403846];
/// Optimum with `tikhonov = 0.4`.
pub const FIXTURE_TIKHONOV_OPTIMUM: [f64; 3] = [-2.366955, 0.158640, 0.311087];

pub const FIXTURE_GAMMA: f64 = 1.0 / 20.0;

fn fixture_rows() -> Vec<Array1<f64>> {
    SIZE.iter().zip(SHAPE.iter()).map(|(&s, &h)| array![1.0, s, h]).collect()
}

/// Features `(1, size, shape)`, label `class`.
pub fn fixture_dense() -> LogisticRegression<Array1<f64>> {
    LogisticRegression::new(fixture_rows(), CLASS.to_vec()).unwrap()
}

pub fn fixture_sparse() -> LogisticRegression<SparseVector> {
    let rows = fixture_rows().iter().map(SparseVector::from_dense).collect();
    LogisticRegression::new(rows, CLASS.to_vec()).unwrap()
}

/// Random sparse logistic problem: `n` samples in dimension `d`, `nnz`
/// nonzeros per sample.
pub fn synthetic_sparse(n: usize, d: usize, nnz: usize, seed: u64) -> LogisticRegression<SparseVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    let truth: Vec<f64> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut rows = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let mut indices: Vec<usize> = Vec::with_capacity(nnz);
        while indices.len() < nnz {
            let k = rng.gen_range(0..d);
            if !indices.contains(&k) {
                indices.push(k);
            }
        }
        indices.sort_unstable();
        let values: Vec<f64> = (0..nnz).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let r: f64 = indices.iter().zip(&values).map(|(&k, v)| truth[k] * v).sum();
        let p = 1.0 / (1.0 + (-r).exp());
        labels.push(if rng.gen_bool(p) { 1.0 } else { 0.0 });
        rows.push(SparseVector::new(d, indices, values).unwrap());
    }
    LogisticRegression::new(rows, labels).unwrap()
}

/// Rows and targets of a consistent least-squares system with solution `(1, −2, 0.5)`.
pub fn consistent_system(n: usize, seed: u64) -> (Vec<Array1<f64>>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let solution = array![1.0, -2.0, 0.5];
    let rows: Vec<Array1<f64>> = (0..n)
        .map(|_| Array1::from_shape_fn(3, |_| rng.gen_range(-1.0..1.0)))
        .collect();
    let targets = rows.iter().map(|a| a.dot(&solution)).collect();
    (rows, targets)
}

pub fn assert_close(actual: &Array1<f64>, expected: &[f64], epsilon: f64) {
    assert_eq!(actual.len(), expected.len());
    for (k, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= epsilon,
            "coordinate {k}: {a} differs from {e} by more than {epsilon}"
        );
    }
}
