//! # SAGA Driver
//!
//! Sequential epoch loop shared by the dense and sparse engines: populate the
//! gradient cache, draw `n` samples per epoch, run the stopping test and the
//! hook, and hand back the advanced seed.

use super::config::{SagaConfig, Setup};
use super::dense::DenseEngine;
use super::jit::JitOperator;
use super::proximal::ProximalOperator;
use super::sparse::SparseEngine;
use super::stopping;
use super::{EpochRunner, Hook, HookInfo, Objective, Solution, Termination};
use crate::error::{Failure, Result, SagaError};
use crate::vector::{ops, SparseVector};
use log::{debug, info};
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::mem;
use std::sync::Arc;

/// Reusable scratch buffers for repeated runs of the same dimension.
///
/// Buffers of the wrong size are reallocated, so one workspace may be shared
/// across problems.
#[derive(Debug, Default)]
pub struct Workspace {
    pub(crate) scratch: Array1<f64>,
    pub(crate) snapshot: Array1<f64>,
}

impl Workspace {
    pub fn new(d: usize) -> Self {
        Workspace {
            scratch: Array1::zeros(d),
            snapshot: Array1::zeros(d),
        }
    }

    pub(crate) fn prepare(&mut self, d: usize) {
        if self.snapshot.len() != d {
            self.snapshot = Array1::zeros(d);
        }
    }
}

/// How far a failed run got.
pub(crate) enum Fault {
    /// The engine's iterate is the last good one.
    Current(SagaError),
    /// The iterate went bad during the epoch; the epoch-start snapshot is the last good one.
    Snapshot(SagaError),
}

pub(crate) struct Outcome {
    pub termination: Termination,
    pub epochs: usize,
    pub iterations: usize,
}

/// Stopping test and hook at the end of epoch `epoch` (0-based).
///
/// Returns the termination reason, if any. A NaN in the iterate is an error.
pub(crate) fn close_epoch(
    epoch: usize,
    x_old: ArrayView1<'_, f64>,
    x_new: ArrayView1<'_, f64>,
    value: f64,
    setup: &Setup,
    hook: Option<&mut Hook>,
) -> Result<Option<Termination>> {
    let check = stopping::evaluate(x_old, x_new, setup.tolerance)?;
    debug!("epoch {epoch}: delta = {:.3e}, value = {value:.6}", check.delta);
    if check.converged {
        return Ok(Some(Termination::Converged));
    }
    if let Some(hook) = hook {
        let info = HookInfo {
            epoch,
            x: x_new,
            delta: check.delta,
            value,
            lambda: setup.raw_lambda,
        };
        if hook(&info) {
            return Ok(Some(Termination::HookStop));
        }
    }
    Ok(None)
}

fn drive<V, E, O>(
    engine: &mut E,
    objective: &mut O,
    n: usize,
    setup: &Setup,
    mut hook: Option<&mut Hook>,
    snapshot: &mut Array1<f64>,
    rng: &mut StdRng,
) -> std::result::Result<Outcome, Fault>
where
    E: EpochRunner<V>,
    O: Objective<V>,
{
    engine.initialize(objective, 0..n).map_err(Fault::Current)?;

    let mut epochs = 0;
    let mut iterations = 0;
    let termination = loop {
        if epochs >= setup.max_epochs {
            break Termination::MaxEpochs;
        }
        if iterations >= setup.max_iterations {
            break Termination::MaxIterations;
        }
        let budget = n.min(setup.max_iterations - iterations);
        snapshot.assign(engine.iterate());
        iterations += engine
            .run_epoch(objective, (0..budget).map(|_| rng.gen_range(0..n)))
            .map_err(Fault::Current)?;
        epochs += 1;

        let closed = close_epoch(
            epochs - 1,
            snapshot.view(),
            engine.iterate().view(),
            engine.last_value(),
            setup,
            hook.as_deref_mut(),
        )
        .map_err(Fault::Snapshot)?;
        if let Some(termination) = closed {
            break termination;
        }
    };
    Ok(Outcome {
        termination,
        epochs,
        iterations,
    })
}

/// Sequential SAGA solver.
///
/// # Example
///
/// ```no_run
/// use rsaga::optim::{Saga, SagaConfig};
/// use rsaga::objective::LogisticRegression;
/// # fn data() -> LogisticRegression<ndarray::Array1<f64>> { unimplemented!() }
///
/// let mut objective = data();
/// let n = objective.len();
/// let mut saga = Saga::new(SagaConfig::new(0.05).with_l1(0.1));
/// let solution = saga.run_dense(&mut objective, n, ndarray::Array1::zeros(3)).unwrap();
/// println!("{:?} after {} epochs", solution.x, solution.epochs);
/// ```
pub struct Saga {
    config: SagaConfig,
    hook: Option<Hook>,
    proximal: Option<Arc<dyn ProximalOperator>>,
    jit: Option<Arc<dyn JitOperator>>,
}

impl Saga {
    pub fn new(config: SagaConfig) -> Self {
        Saga {
            config,
            hook: None,
            proximal: None,
            jit: None,
        }
    }

    /// Installs a per-epoch hook. Returning `true` from it stops the run.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&HookInfo<'_>) -> bool + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Uses `op` (with its own lambda, not rescaled) as the proximal map.
    pub fn with_proximal_operator<P: ProximalOperator + 'static>(mut self, op: P) -> Self {
        self.proximal = Some(Arc::new(op));
        self
    }

    /// Uses `op` (with its own lambda, not rescaled) for lazy sparse updates.
    pub fn with_jit_operator<J: JitOperator + 'static>(mut self, op: J) -> Self {
        self.jit = Some(Arc::new(op));
        self
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    fn setup(&self, n: usize, d: usize) -> Result<Setup> {
        Setup::new(&self.config, self.proximal.as_ref(), self.jit.as_ref(), n, d)
    }

    /// Minimizes a dense objective of `n` samples from `x0`.
    pub fn run_dense<O>(&mut self, objective: &mut O, n: usize, x0: Array1<f64>) -> std::result::Result<Solution, Failure>
    where
        O: Objective<Array1<f64>>,
    {
        self.run_dense_with(&mut Workspace::default(), objective, n, x0)
    }

    /// Like [`Saga::run_dense`], reusing the buffers of `workspace`.
    pub fn run_dense_with<O>(
        &mut self,
        workspace: &mut Workspace,
        objective: &mut O,
        n: usize,
        x0: Array1<f64>,
    ) -> std::result::Result<Solution, Failure>
    where
        O: Objective<Array1<f64>>,
    {
        let setup = match self.setup(n, x0.len()).and_then(|s| s.require_eager().map(|_| s)) {
            Ok(setup) => setup,
            Err(e) => return Err(Failure::new(e, x0, self.config.seed)),
        };
        let engine = DenseEngine::new(x0, n, &setup, mem::take(&mut workspace.scratch));
        self.run_engine::<Array1<f64>, _, _>(engine, workspace, objective, n, &setup)
    }

    /// Minimizes a sparse objective of `n` samples from `x0`, lazily when
    /// `lazy_updates` is set or a jit operator is installed.
    pub fn run_sparse<O>(&mut self, objective: &mut O, n: usize, x0: Array1<f64>) -> std::result::Result<Solution, Failure>
    where
        O: Objective<SparseVector>,
    {
        self.run_sparse_with(&mut Workspace::default(), objective, n, x0)
    }

    /// Like [`Saga::run_sparse`], reusing the buffers of `workspace`.
    pub fn run_sparse_with<O>(
        &mut self,
        workspace: &mut Workspace,
        objective: &mut O,
        n: usize,
        x0: Array1<f64>,
    ) -> std::result::Result<Solution, Failure>
    where
        O: Objective<SparseVector>,
    {
        let setup = match self.setup(n, x0.len()) {
            Ok(setup) => setup,
            Err(e) => return Err(Failure::new(e, x0, self.config.seed)),
        };
        let engine = SparseEngine::new(x0, n, &setup, mem::take(&mut workspace.scratch));
        self.run_engine::<SparseVector, _, _>(engine, workspace, objective, n, &setup)
    }

    fn run_engine<V, E, O>(
        &mut self,
        mut engine: E,
        workspace: &mut Workspace,
        objective: &mut O,
        n: usize,
        setup: &Setup,
    ) -> std::result::Result<Solution, Failure>
    where
        E: EpochRunner<V>,
        O: Objective<V>,
    {
        let d = engine.iterate().len();
        info!(
            "SAGA: n = {n}, d = {d}, gamma = {}, regularizer = {:?}",
            setup.gamma, setup.regularizer
        );
        workspace.prepare(d);
        workspace.snapshot.assign(engine.iterate());
        let mut rng = StdRng::seed_from_u64(setup.seed);
        let result = drive(
            &mut engine,
            objective,
            n,
            setup,
            self.hook.as_mut(),
            &mut workspace.snapshot,
            &mut rng,
        );
        let (x, scratch) = engine.into_buffers();
        workspace.scratch = scratch;
        let seed = rng.gen::<u64>();

        match result {
            Ok(outcome) => {
                info!(
                    "SAGA finished: {:?} after {} epochs ({} iterations)",
                    outcome.termination, outcome.epochs, outcome.iterations
                );
                Ok(Solution {
                    x,
                    seed,
                    epochs: outcome.epochs,
                    iterations: outcome.iterations,
                    termination: outcome.termination,
                })
            }
            Err(Fault::Current(e)) if ops::all_finite(x.view()) => Err(Failure::new(e, x, seed)),
            Err(Fault::Current(e)) | Err(Fault::Snapshot(e)) => {
                Err(Failure::new(e, workspace.snapshot.clone(), seed))
            }
        }
    }
}
