//! # Dense SAGA Engine
//!
//! Every step touches all `d` coordinates:
//! `x ← prox(x − gamma · (Δ + s / n))` with `Δ = w_new·g_new − w_old·g_old`,
//! which collapses to `(w_new − w_old)·g` when both records share a fixed
//! feature vector.

use super::cache::{GradientCache, GradientRecord};
use super::config::{Setup, StepRule};
use super::{EpochRunner, Evaluation, Objective};
use crate::error::{Result, SagaError};
use crate::vector::DirectionVector;
use ndarray::{Array1, ArrayView1, Zip};

/// Rejects evaluations that cannot be applied to an iterate of dimension `d`.
pub(crate) fn check_evaluation<V: DirectionVector>(index: usize, eval: &Evaluation<V>, d: usize) -> Result<()> {
    let got = eval.direction.values().dim();
    if got != d {
        return Err(SagaError::DimensionMismatch { index, expected: d, got });
    }
    if eval.weight.is_nan() || eval.direction.values().has_nan() {
        return Err(SagaError::Numeric(format!("gradient at sample {index} contains NaN")));
    }
    Ok(())
}

pub(crate) struct DenseEngine {
    x: Array1<f64>,
    cache: GradientCache<Array1<f64>>,
    gamma: f64,
    rule: StepRule,
    /// Holds `Δ + s/n`, then the pre-proximal point.
    scratch: Array1<f64>,
    last_value: f64,
}

impl DenseEngine {
    /// `scratch` is reused when it already has the right length. The setup
    /// must have passed [`Setup::require_eager`].
    pub(crate) fn new(x0: Array1<f64>, n: usize, setup: &Setup, scratch: Array1<f64>) -> Self {
        let d = x0.len();
        let scratch = if scratch.len() == d { scratch } else { Array1::zeros(d) };
        DenseEngine {
            x: x0,
            cache: GradientCache::new(n, d),
            gamma: setup.gamma,
            rule: setup.rule.clone(),
            scratch,
            last_value: f64::NAN,
        }
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &GradientCache<Array1<f64>> {
        &self.cache
    }

    fn evaluate<O>(&mut self, objective: &mut O, index: usize) -> Result<Evaluation<Array1<f64>>>
    where
        O: Objective<Array1<f64>>,
    {
        let eval = objective
            .evaluate(index, &self.x)
            .map_err(|source| SagaError::Evaluation { index, source })?;
        check_evaluation(index, &eval, self.x.len())?;
        self.last_value = eval.value;
        Ok(eval)
    }

    fn step<O>(&mut self, objective: &mut O, j: usize) -> Result<()>
    where
        O: Objective<Array1<f64>>,
    {
        let old = self
            .cache
            .get(j)
            .cloned()
            .ok_or(SagaError::IndexOutOfBounds { index: j, len: self.cache.len() })?;
        let eval = self.evaluate(objective, j)?;

        let n_eff = self.cache.populated() as f64;
        let step = &mut self.scratch;
        Zip::from(&mut *step)
            .and(self.cache.running_sum())
            .for_each(|t, &s| *t = s / n_eff);
        if old.direction.key().same_as(&eval.direction.key()) {
            step.scaled_add(eval.weight - old.weight, old.direction.values());
        } else {
            step.scaled_add(eval.weight, eval.direction.values());
            step.scaled_add(-old.weight, old.direction.values());
        }

        let gamma = self.gamma;
        match &self.rule {
            StepRule::Proximal(op) => {
                step.zip_mut_with(&self.x, |t, &x| *t = x - gamma * *t);
                op.eval(self.x.view_mut(), step.view());
            }
            _ => self.x.scaled_add(-gamma, &*step),
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
}

impl EpochRunner<Array1<f64>> for DenseEngine {
    fn iterate(&self) -> &Array1<f64> {
        &self.x
    }

    fn set_iterate(&mut self, x: ArrayView1<'_, f64>) {
        self.x.assign(&x);
    }

    fn initialize<O>(&mut self, objective: &mut O, indices: std::ops::Range<usize>) -> Result<()>
    where
        O: Objective<Array1<f64>>,
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
        O: Objective<Array1<f64>>,
        I: IntoIterator<Item = usize>,
    {
        let mut steps = 0;
        for j in indices {
            self.step(objective, j)?;
            steps += 1;
        }
        Ok(steps)
    }

    fn last_value(&self) -> f64 {
        self.last_value
    }

    fn into_buffers(self) -> (Array1<f64>, Array1<f64>) {
        (self.x, self.scratch)
    }
}
