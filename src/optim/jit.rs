//! # Lazy ("just-in-time") Updates
//!
//! On the sparse path every step conceptually moves *all* coordinates: each
//! one drifts by `gamma * s_k / n` (the gradient average) and is then shrunk
//! by the regularizer. Only the coordinates in the support of the sampled
//! direction change `s`, so for every other coordinate the per-step update is
//! the same map applied again and again. [`LazyState`] records, per
//! coordinate, the last step at which that map was materialized, and a
//! [`JitOperator`] collapses the pending applications into one closed-form
//! catch-up when the coordinate is next read, or at the end of the epoch.
//!
//! The catch-up is exact: `eval(k, x, drift, m)` must equal `m` applications
//! of `x ← prox(x − drift / m)`.

use super::proximal::soft_threshold;
use ndarray::Array1;
use std::fmt::Debug;

/// Closed-form multi-step update of a single coordinate.
pub trait JitOperator: Debug + Send + Sync {
    fn lambda(&self) -> f64;

    fn set_lambda(&mut self, lambda: f64);

    /// Applies `steps` consecutive updates `x ← prox(x − drift / steps)` to
    /// coordinate `coordinate` and returns the result. `steps >= 1`.
    fn eval(&self, coordinate: usize, x: f64, drift: f64, steps: usize) -> f64;
}

// --- Operators ---

/// Lazy drift without regularization.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IdentityJit;

impl JitOperator for IdentityJit {
    fn lambda(&self) -> f64 {
        0.0
    }

    fn set_lambda(&mut self, _lambda: f64) {}

    fn eval(&self, _coordinate: usize, x: f64, drift: f64, _steps: usize) -> f64 {
        x - drift
    }
}

/// Lazy soft-thresholding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct L1Jit {
    lambda: f64,
}

impl L1Jit {
    pub fn new(lambda: f64) -> Self {
        L1Jit { lambda }
    }
}

impl JitOperator for L1Jit {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn eval(&self, _coordinate: usize, x: f64, drift: f64, steps: usize) -> f64 {
        if steps == 1 {
            return soft_threshold(x - drift, self.lambda);
        }
        l1_catch_up(x, drift / steps as f64, self.lambda, steps)
    }
}

/// `steps` iterations of `x ← soft(x − a, λ)`.
///
/// The map is linear with slope one away from the dead zone, so the
/// trajectory splits into at most a few linear phases: walk towards zero,
/// land in (or jump over) the dead zone, then either stay at zero or walk
/// away with constant velocity. Each phase is advanced in one go.
fn l1_catch_up(mut x: f64, mut a: f64, lambda: f64, mut steps: usize) -> f64 {
    let mut sign = 1.0;
    while steps > 0 {
        // the map is odd, so work on the positive half-line
        if x < 0.0 {
            x = -x;
            a = -a;
            sign = -sign;
        }
        if x == 0.0 {
            x = soft_threshold(-a, lambda);
            steps -= 1;
            if x == 0.0 {
                break;
            }
            continue;
        }
        let v = -(a + lambda);
        if v >= 0.0 {
            x += steps as f64 * v;
            break;
        }
        // number of steps whose result is still strictly positive
        let linear = ((x / -v).ceil() as usize).saturating_sub(1).min(steps);
        x += linear as f64 * v;
        steps -= linear;
        if steps > 0 {
            x = soft_threshold(x - a, lambda);
            steps -= 1;
        }
    }
    sign * x
}

/// Lazy ridge shrinkage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TikhonovJit {
    lambda: f64,
}

impl TikhonovJit {
    pub fn new(lambda: f64) -> Self {
        TikhonovJit { lambda }
    }
}

impl JitOperator for TikhonovJit {
    fn lambda(&self) -> f64 {
        self.lambda
    }

    fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    fn eval(&self, _coordinate: usize, x: f64, drift: f64, steps: usize) -> f64 {
        if steps == 1 {
            return (x - drift) / (self.lambda + 1.0);
        }
        if self.lambda == 0.0 {
            return x - drift;
        }
        // x_{t+1} = q (x_t − a) has fixed point −a/λ and contracts by q per step
        let a = drift / steps as f64;
        let q = 1.0 / (1.0 + self.lambda);
        let fixed = -a / self.lambda;
        let exponent = steps.min(i32::MAX as usize) as i32;
        fixed + (x - fixed) * q.powi(exponent)
    }
}

// --- Per-coordinate State ---

/// Bookkeeping of pending per-coordinate updates within one epoch.
///
/// Steps are numbered from 1. `last[k]` is the last step whose update of
/// coordinate `k` has been materialized, and `cumulative[t]` is the total of
/// `gamma / n_eff` over steps `1..=t` (`cumulative[0] = 0`), so the drift
/// pending for `k` at step `i` is `s_k * (cumulative[i-1] − cumulative[last[k]])`.
#[derive(Clone, Debug)]
pub(crate) struct LazyState {
    last: Vec<usize>,
    cumulative: Vec<f64>,
    step: usize,
}

impl LazyState {
    pub(crate) fn new(d: usize) -> Self {
        LazyState {
            last: vec![0; d],
            cumulative: vec![0.0],
            step: 0,
        }
    }

    /// Opens the next step, whose uniform drift rate is `increment = gamma / n_eff`.
    pub(crate) fn begin_step(&mut self, increment: f64) -> usize {
        self.step += 1;
        let total = self.cumulative[self.step - 1] + increment;
        self.cumulative.push(total);
        self.step
    }

    pub(crate) fn step(&self) -> usize {
        self.step
    }

    /// Withdraws the step opened last, after a failed evaluation.
    /// Coordinates caught up during that step stay valid.
    pub(crate) fn cancel_step(&mut self) {
        if self.step > 0 {
            self.cumulative.pop();
            self.step -= 1;
        }
    }

    /// Materializes every update of coordinate `k` before the current step.
    pub(crate) fn catch_up(&mut self, op: &dyn JitOperator, k: usize, x: &mut f64, s_k: f64) {
        let target = self.step.saturating_sub(1);
        let last = self.last[k];
        if target > last {
            let drift = s_k * (self.cumulative[target] - self.cumulative[last]);
            *x = op.eval(k, *x, drift, target - last);
            self.last[k] = target;
        }
    }

    /// Applies the current step's update to coordinate `k`, which must be caught up.
    pub(crate) fn apply(&mut self, op: &dyn JitOperator, k: usize, x: &mut f64, drift: f64) {
        debug_assert_eq!(self.last[k] + 1, self.step);
        *x = op.eval(k, *x, drift, 1);
        self.last[k] = self.step;
    }

    /// Materializes all pending updates (the one O(d) sweep per epoch) and
    /// resets the state for the next epoch.
    pub(crate) fn flush(&mut self, op: &dyn JitOperator, x: &mut Array1<f64>, s: &Array1<f64>) {
        let step = self.step;
        for (k, xk) in x.iter_mut().enumerate() {
            let last = self.last[k];
            if step > last {
                let drift = s[k] * (self.cumulative[step] - self.cumulative[last]);
                *xk = op.eval(k, *xk, drift, step - last);
            }
            self.last[k] = 0;
        }
        self.cumulative.truncate(1);
        self.step = 0;
    }
}
