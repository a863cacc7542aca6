//! # Logistic Regression
//!
//! Binary logistic regression with labels in `{0, 1}`. Sample `i` contributes
//! the negative log-likelihood `log(1 + e^r) − y·r` with `r = a_i · x`; its
//! gradient `(σ(r) − y)·a_i` is reported in rank-1 form with the feature
//! vector `a_i` as fixed direction.

use crate::error::BoxError;
use crate::optim::{Evaluation, Objective};
use crate::vector::DirectionVector;
use ndarray::Array1;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ObjectiveError {
    #[error("{features} feature vectors but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
    #[error("Label {label} of sample {index} is not 0 or 1")]
    InvalidLabel { index: usize, label: f64 },
    #[error("Feature vector {index} has dimension {got}, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, got: usize },
    #[error("Logistic regression needs at least one sample")]
    Empty,
    #[error("Sample index {index} out of bounds for {len} samples")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// `log(1 + e^r)` without overflow.
fn softplus(r: f64) -> f64 {
    r.max(0.0) + (-r.abs()).exp().ln_1p()
}

fn sigmoid(r: f64) -> f64 {
    if r >= 0.0 {
        1.0 / (1.0 + (-r).exp())
    } else {
        let e = r.exp();
        e / (1.0 + e)
    }
}

/// Logistic regression over dense (`Array1<f64>`) or sparse
/// ([`SparseVector`](crate::vector::SparseVector)) feature vectors.
///
/// Feature vectors sit behind `Arc`, so clones handed to pool workers share
/// the data.
#[derive(Debug)]
pub struct LogisticRegression<V> {
    features: Vec<Arc<V>>,
    labels: Vec<f64>,
    dim: usize,
}

impl<V> Clone for LogisticRegression<V> {
    fn clone(&self) -> Self {
        LogisticRegression {
            features: self.features.clone(),
            labels: self.labels.clone(),
            dim: self.dim,
        }
    }
}

impl<V: DirectionVector> LogisticRegression<V> {
    /// # Arguments
    /// * `features`: One feature vector per sample, all of the same dimension.
    /// * `labels`: One label per sample, `0.0` or `1.0`.
    pub fn new(features: Vec<V>, labels: Vec<f64>) -> Result<Self, ObjectiveError> {
        if features.len() != labels.len() {
            return Err(ObjectiveError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        let dim = features.first().map(|f| f.dim()).ok_or(ObjectiveError::Empty)?;
        for (index, f) in features.iter().enumerate() {
            if f.dim() != dim {
                return Err(ObjectiveError::DimensionMismatch {
                    index,
                    expected: dim,
                    got: f.dim(),
                });
            }
        }
        if let Some((index, &label)) = labels.iter().enumerate().find(|&(_, &y)| y != 0.0 && y != 1.0) {
            return Err(ObjectiveError::InvalidLabel { index, label });
        }
        Ok(LogisticRegression {
            features: features.into_iter().map(Arc::new).collect(),
            labels,
            dim,
        })
    }

    /// Number of samples `n`.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dimension `d` of the parameter vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn features(&self) -> &[Arc<V>] {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// Mean negative log-likelihood at `x`.
    pub fn loss(&self, x: &Array1<f64>) -> f64 {
        let total: f64 = self
            .features
            .iter()
            .zip(&self.labels)
            .map(|(a, &y)| {
                let r = a.dot(x);
                softplus(r) - y * r
            })
            .sum();
        total / self.len() as f64
    }

    /// Mean gradient `(1/n) Σ (σ(a_i·x) − y_i)·a_i` at `x`.
    pub fn gradient(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut g = Array1::zeros(self.dim);
        for (a, &y) in self.features.iter().zip(&self.labels) {
            a.scaled_add_to(sigmoid(a.dot(x)) - y, &mut g);
        }
        g / self.len() as f64
    }
}

impl<V: DirectionVector> Objective<V> for LogisticRegression<V> {
    fn evaluate(&mut self, index: usize, x: &Array1<f64>) -> Result<Evaluation<V>, BoxError> {
        let a = self.features.get(index).ok_or(ObjectiveError::IndexOutOfBounds {
            index,
            len: self.features.len(),
        })?;
        let y = self.labels[index];
        let r = a.dot(x);
        Ok(Evaluation::fixed(softplus(r) - y * r, sigmoid(r) - y, index, Arc::clone(a)))
    }
}
