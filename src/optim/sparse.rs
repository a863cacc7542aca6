//! # Sparse SAGA Engine
//!
//! Directions are [`SparseVector`]s. The gradient difference `Δ` only lives
//! on the union of the old and new supports, but the gradient-average term
//! `s / n` moves every coordinate. The eager path pays `O(d)` per step for
//! that; the lazy path defers it through [`LazyState`] and settles all
//! coordinates once at the end of the epoch.

use super::cache::{GradientCache, GradientRecord};
use super::config::{Setup, StepRule};
use super::dense::check_evaluation;
use super::jit::{JitOperator, LazyState};
use super::{DirectionKey, EpochRunner, Evaluation, Objective};
use crate::error::{Result, SagaError};
use crate::vector::{ops, SparseVector};
use log::trace;
use ndarray::{Array1, ArrayView1, Zip};
use std::sync::Arc;

struct LazyPath {
    op: Arc<dyn JitOperator>,
    state: LazyState,
}

pub(crate) struct SparseEngine {
    x: Array1<f64>,
    cache: GradientCache<SparseVector>,
    gamma: f64,
    rule: StepRule,
    lazy: Option<LazyPath>,
    /// Eager path: `s/n + Δ`, then the pre-proximal point.
    scratch: Array1<f64>,
    /// Support of `Δ` for the current step, with the matching values.
    support: Vec<usize>,
    delta: Vec<f64>,
    last_value: f64,
}

/// Writes `Δ = w_new·g_new − w_old·g_old` as (support, values).
fn difference(
    old: &GradientRecord<SparseVector>,
    new: &Evaluation<SparseVector>,
    support: &mut Vec<usize>,
    delta: &mut Vec<f64>,
) {
    delta.clear();
    let (g_old, g_new) = (old.direction.values(), new.direction.values());
    if old.direction.key().same_as(&new.direction.key()) {
        let c = new.weight - old.weight;
        support.clear();
        support.extend_from_slice(g_old.indices());
        delta.extend(g_old.values().iter().map(|&v| c * v));
    } else {
        ops::union_support(g_new.indices(), g_old.indices(), support);
        delta.extend(
            support
                .iter()
                .map(|&k| new.weight * g_new.get(k) - old.weight * g_old.get(k)),
        );
    }
}

impl SparseEngine {
    pub(crate) fn new(x0: Array1<f64>, n: usize, setup: &Setup, scratch: Array1<f64>) -> Self {
        let d = x0.len();
        let lazy = match &setup.rule {
            StepRule::Lazy(op) => Some(LazyPath {
                op: Arc::clone(op),
                state: LazyState::new(d),
            }),
            _ => None,
        };
        // the lazy path never touches the scratch buffer
        let scratch = if lazy.is_some() || scratch.len() == d {
            scratch
        } else {
            Array1::zeros(d)
        };
        SparseEngine {
            x: x0,
            cache: GradientCache::new(n, d),
            gamma: setup.gamma,
            rule: setup.rule.clone(),
            lazy,
            scratch,
            support: Vec::new(),
            delta: Vec::new(),
            last_value: f64::NAN,
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &GradientCache<SparseVector> {
        &self.cache
    }

    fn evaluate<O>(&mut self, objective: &mut O, index: usize) -> Result<Evaluation<SparseVector>>
    where
        O: Objective<SparseVector>,
    {
        let eval = objective
            .evaluate(index, &self.x)
            .map_err(|source| SagaError::Evaluation { index, source })?;
        check_evaluation(index, &eval, self.x.len())?;
        // deferred coordinates are only caught up on a fixed support
        if self.lazy.is_some() && eval.direction.key() == DirectionKey::Transient {
            return Err(SagaError::config(format!(
                "lazy updates need fixed feature directions, sample {index} returned a full gradient"
            )));
        }
        self.last_value = eval.value;
        Ok(eval)
    }

    fn step<O>(&mut self, objective: &mut O, j: usize) -> Result<()>
    where
        O: Objective<SparseVector>,
    {
        let old = self
            .cache
            .get(j)
            .cloned()
            .ok_or(SagaError::IndexOutOfBounds { index: j, len: self.cache.len() })?;
        let n_eff = self.cache.populated() as f64;

        if let Some(LazyPath { op, state }) = self.lazy.as_mut() {
            state.begin_step(self.gamma / n_eff);
            // the objective reads the support of the cached direction
            let s = self.cache.running_sum();
            for &k in old.direction.values().indices() {
                state.catch_up(op.as_ref(), k, &mut self.x[k], s[k]);
            }
        }

        let eval = match self.evaluate(objective, j) {
            Ok(eval) => eval,
            Err(e) => {
                if let Some(lazy) = self.lazy.as_mut() {
                    lazy.state.cancel_step();
                }
                return Err(e);
            }
        };
        difference(&old, &eval, &mut self.support, &mut self.delta);

        let gamma = self.gamma;
        let s = self.cache.running_sum();
        if let Some(LazyPath { op, state }) = self.lazy.as_mut() {
            for (&k, &dk) in self.support.iter().zip(&self.delta) {
                let xk = &mut self.x[k];
                state.catch_up(op.as_ref(), k, xk, s[k]);
                state.apply(op.as_ref(), k, xk, gamma * (s[k] / n_eff + dk));
            }
        } else {
            let step = &mut self.scratch;
            Zip::from(&mut *step).and(s).for_each(|t, &s| *t = s / n_eff);
            for (&k, &dk) in self.support.iter().zip(&self.delta) {
                step[k] += dk;
            }
            match &self.rule {
                StepRule::Proximal(op) => {
                    step.zip_mut_with(&self.x, |t, &x| *t = x - gamma * *t);
                    op.eval(self.x.view_mut(), step.view());
                }
                _ => self.x.scaled_add(-gamma, &*step),
            }
        }

        self.cache.insert(
            j,
            GradientRecord {
                weight: eval.weight,
                direction: eval.direction,
            },
        )?;
        Ok(())
    }

    /// Materializes every deferred update (lazy path only).
    fn settle(&mut self) {
        if let Some(LazyPath { op, state }) = self.lazy.as_mut() {
            trace!("settling {} deferred steps", state.step());
            state.flush(op.as_ref(), &mut self.x, self.cache.running_sum());
        }
    }
}

impl EpochRunner<SparseVector> for SparseEngine {
    fn iterate(&self) -> &Array1<f64> {
        &self.x
    }

    fn set_iterate(&mut self, x: ArrayView1<'_, f64>) {
        self.x.assign(&x);
    }

    fn initialize<O>(&mut self, objective: &mut O, indices: std::ops::Range<usize>) -> Result<()>
    where
        O: Objective<SparseVector>,
    {
        for i in indices {
            let eval = self.evaluate(objective, i)?;
            self.cache.insert(
                i,
                GradientRecord {
                    weight: eval.weight,
                    direction: eval.direction,
                },
            )?;
        }
        Ok(())
    }

    fn run_epoch<O, I>(&mut self, objective: &mut O, indices: I) -> Result<usize>
    where
        O: Objective<SparseVector>,
        I: IntoIterator<Item = usize>,
    {
        let mut steps = 0;
        for j in indices {
            if let Err(e) = self.step(objective, j) {
                self.settle();
                return Err(e);
            }
            steps += 1;
        }
        self.settle();
        Ok(steps)
    }

    fn last_value(&self) -> f64 {
        self.last_value
    }

    fn into_buffers(self) -> (Array1<f64>, Array1<f64>) {
        (self.x, self.scratch)
    }
}
