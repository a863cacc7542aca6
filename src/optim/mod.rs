//! # Optimization Algorithms (`optim`)
//!
//! SAGA for finite sums `(1/n) Σ f_i(x) + R(x)`. Each `f_i` is reached only
//! through an [`Objective`] callback returning a rank-1 gradient record
//! `(weight, direction)`; `R` is applied through a proximal map or, on the
//! sparse path, through the lazy just-in-time engine.

use crate::error::BoxError;
use ndarray::{Array1, ArrayView1};
use std::sync::Arc;

// --- Submodules ---
pub mod cache;
pub mod config;
pub(crate) mod dense;
pub mod jit;
pub mod proximal;
pub mod saga;
pub(crate) mod sparse;
pub mod stopping;

// Re-export the public surface
pub use cache::GradientCache;
pub use config::{MergeRule, Regularizer, SagaConfig};
pub use jit::{IdentityJit, JitOperator, L1Jit, TikhonovJit};
pub use proximal::{L1Proximal, L2Proximal, ProximalOperator, TikhonovProximal};
pub use saga::{Saga, Workspace};
pub use stopping::StopCheck;

// --- Objective Contract ---

/// Identity of a gradient direction.
///
/// Two records whose keys are both `Fixed` and equal share the same feature
/// vector, so the update collapses to `(w_new - w_old) * direction`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionKey {
    /// A fixed feature vector, identified by a stable id (usually the sample index).
    Fixed(usize),
    /// A freshly computed gradient with no identity across calls.
    Transient,
}

impl DirectionKey {
    pub fn same_as(&self, other: &DirectionKey) -> bool {
        matches!((self, other), (DirectionKey::Fixed(a), DirectionKey::Fixed(b)) if a == b)
    }
}

/// Gradient direction returned by an objective.
#[derive(Debug)]
pub struct Direction<V> {
    key: DirectionKey,
    values: Arc<V>,
}

// Manual impl: cloning only bumps the `Arc`, so `V` need not be `Clone`.
impl<V> Clone for Direction<V> {
    fn clone(&self) -> Self {
        Direction {
            key: self.key,
            values: Arc::clone(&self.values),
        }
    }
}

impl<V> Direction<V> {
    /// A fixed feature vector shared across evaluations of the same sample.
    pub fn fixed(id: usize, values: Arc<V>) -> Self {
        Direction {
            key: DirectionKey::Fixed(id),
            values,
        }
    }

    /// A gradient computed for this call only.
    pub fn transient(values: V) -> Self {
        Direction {
            key: DirectionKey::Transient,
            values: Arc::new(values),
        }
    }

    pub fn key(&self) -> DirectionKey {
        self.key
    }

    pub fn values(&self) -> &V {
        &self.values
    }
}

/// Result of one objective evaluation at sample `i`: the per-sample gradient
/// is `weight * direction`.
#[derive(Clone, Debug)]
pub struct Evaluation<V> {
    pub value: f64,
    pub weight: f64,
    pub direction: Direction<V>,
}

impl<V> Evaluation<V> {
    /// Generalized-linear form: fixed feature vector scaled by `weight`.
    pub fn fixed(value: f64, weight: f64, id: usize, direction: Arc<V>) -> Self {
        Evaluation {
            value,
            weight,
            direction: Direction::fixed(id, direction),
        }
    }

    /// Full gradient with unit weight.
    pub fn gradient(value: f64, gradient: V) -> Self {
        Evaluation {
            value,
            weight: 1.0,
            direction: Direction::transient(gradient),
        }
    }
}

/// Per-sample gradient oracle.
///
/// Must be safe to call repeatedly at the same index with a changing
/// iterate, and must not keep references to the iterate across calls.
pub trait Objective<V> {
    fn evaluate(&mut self, index: usize, x: &Array1<f64>) -> Result<Evaluation<V>, BoxError>;
}

impl<V, F> Objective<V> for F
where
    F: FnMut(usize, &Array1<f64>) -> Result<Evaluation<V>, BoxError>,
{
    fn evaluate(&mut self, index: usize, x: &Array1<f64>) -> Result<Evaluation<V>, BoxError> {
        self(index, x)
    }
}

// --- Hook and Results ---

/// What the per-epoch hook gets to see.
#[derive(Debug)]
pub struct HookInfo<'a> {
    pub epoch: usize,
    pub x: ArrayView1<'a, f64>,
    /// Relative change reported by the stopping criterion.
    pub delta: f64,
    /// Last objective value observed during the epoch.
    pub value: f64,
    /// Raw (unscaled) regularization constant, zero without regularization.
    pub lambda: f64,
}

/// Per-epoch callback; returning `true` stops the run without error.
pub type Hook = Box<dyn FnMut(&HookInfo<'_>) -> bool + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Converged,
    HookStop,
    MaxEpochs,
    MaxIterations,
}

/// Successful run.
#[derive(Clone, Debug)]
pub struct Solution {
    pub x: Array1<f64>,
    /// Advanced RNG seed; pass it back as `seed` to continue the sequence.
    pub seed: u64,
    pub epochs: usize,
    /// Total number of sample draws.
    pub iterations: usize,
    pub termination: Termination,
}

// --- Engine Seam ---

/// One SAGA engine (dense or sparse) as driven by the epoch loop.
///
/// The sequential driver and every worker of the pool run the same engine
/// code; only the source of sample indices differs.
pub(crate) trait EpochRunner<V> {
    fn iterate(&self) -> &Array1<f64>;

    /// Overwrites the iterate (worker broadcast).
    fn set_iterate(&mut self, x: ArrayView1<'_, f64>);

    /// Populates the gradient cache for every index in `indices` at the current iterate.
    fn initialize<O>(&mut self, objective: &mut O, indices: std::ops::Range<usize>) -> crate::error::Result<()>
    where
        O: Objective<V>;

    /// Runs one epoch over the given draws. Returns the number of steps taken.
    fn run_epoch<O, I>(&mut self, objective: &mut O, indices: I) -> crate::error::Result<usize>
    where
        O: Objective<V>,
        I: IntoIterator<Item = usize>;

    /// Last objective value seen (NaN before the first evaluation).
    fn last_value(&self) -> f64;

    /// Consumes the engine, returning `(iterate, scratch buffer)`.
    fn into_buffers(self) -> (Array1<f64>, Array1<f64>)
    where
        Self: Sized;
}
