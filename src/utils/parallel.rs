//! # Parallel SAGA (CPU Threading)
//!
//! Data-parallel SAGA on a `rayon` thread pool. The sample range `[0, n)` is
//! split into `p` contiguous blocks; every worker owns a clone of the
//! objective and a full engine (iterate, gradient cache, lazy state) that only
//! ever samples from its own block. Once per epoch the driving thread
//! broadcasts the merged iterate, draws every worker's indices, runs all
//! workers to the barrier and reduces their iterates coordinate-wise.

use crate::error::{Failure, Result, SagaError};
use crate::optim::config::{MergeRule, SagaConfig, Setup};
use crate::optim::dense::DenseEngine;
use crate::optim::saga::{close_epoch, Fault, Outcome};
use crate::optim::sparse::SparseEngine;
use crate::optim::{EpochRunner, Hook, HookInfo, JitOperator, Objective, ProximalOperator, Solution, Termination};
use crate::vector::{ops, SparseVector};
use log::{info, trace, warn};
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

/// Contiguous, near-equal blocks `[b·n/p, (b+1)·n/p)`.
pub fn partition(n: usize, p: usize) -> Vec<Range<usize>> {
    (0..p).map(|b| b * n / p..(b + 1) * n / p).collect()
}

/// Splits an epoch budget over the blocks in proportion to their size.
/// The remainder goes one draw at a time to the leading blocks.
fn quotas(blocks: &[Range<usize>], n: usize, budget: usize, out: &mut Vec<usize>) {
    out.clear();
    out.extend(blocks.iter().map(|b| b.len() * budget / n));
    let mut left = budget - out.iter().sum::<usize>();
    for q in out.iter_mut() {
        if left == 0 {
            break;
        }
        *q += 1;
        left -= 1;
    }
}

/// OS threads backing `workers` workers; extra workers share threads.
fn thread_count(workers: usize) -> usize {
    workers.min(rayon::current_num_threads()).max(1)
}

// --- Workers ---

struct Worker<V, E, O> {
    engine: E,
    objective: O,
    block: Range<usize>,
    draws: Vec<usize>,
    _direction: PhantomData<fn() -> V>,
}

impl<V, E, O> Worker<V, E, O>
where
    E: EpochRunner<V>,
    O: Objective<V>,
{
    fn initialize(&mut self) -> Result<()> {
        self.engine.initialize(&mut self.objective, self.block.clone())
    }

    fn run_epoch(&mut self) -> Result<usize> {
        self.engine.run_epoch(&mut self.objective, self.draws.iter().copied())
    }
}

/// Settings of one pooled run, resolved before any sampling.
struct PoolPlan {
    setup: Setup,
    workers: usize,
    merge: MergeRule,
}

/// Shared-memory parallel SAGA solver.
///
/// With one worker the trajectory (iterate and returned seed) is identical to
/// [`crate::optim::Saga`] under the same configuration.
pub struct ParallelSaga {
    config: SagaConfig,
    hook: Option<Hook>,
    proximal: Option<Arc<dyn ProximalOperator>>,
    jit: Option<Arc<dyn JitOperator>>,
}

impl ParallelSaga {
    pub fn new(config: SagaConfig) -> Self {
        ParallelSaga {
            config,
            hook: None,
            proximal: None,
            jit: None,
        }
    }

    /// Installs a per-epoch hook, called on the merged iterate.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&HookInfo<'_>) -> bool + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn with_proximal_operator<P: ProximalOperator + 'static>(mut self, op: P) -> Self {
        self.proximal = Some(Arc::new(op));
        self
    }

    pub fn with_jit_operator<J: JitOperator + 'static>(mut self, op: J) -> Self {
        self.jit = Some(Arc::new(op));
        self
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    fn plan(&self, n: usize, d: usize) -> Result<PoolPlan> {
        let setup = Setup::new(&self.config, self.proximal.as_ref(), self.jit.as_ref(), n, d)?;
        let requested = self.config.workers.unwrap_or_else(rayon::current_num_threads);
        if requested > n {
            warn!("{requested} workers requested for {n} samples, using {n}");
        }
        Ok(PoolPlan {
            setup,
            workers: requested.min(n),
            merge: self.config.merge,
        })
    }

    /// Minimizes a dense objective; every worker gets its own clone of `objective`.
    pub fn run_dense<O>(&mut self, objective: &O, n: usize, x0: Array1<f64>) -> std::result::Result<Solution, Failure>
    where
        O: Objective<Array1<f64>> + Clone + Send,
    {
        let plan = match self.plan(n, x0.len()).and_then(|p| p.setup.require_eager().map(|_| p)) {
            Ok(plan) => plan,
            Err(e) => return Err(Failure::new(e, x0, self.config.seed)),
        };
        let setup = plan.setup.clone();
        self.run_pool::<Array1<f64>, _, _, _>(plan, objective, n, x0, |x| {
            DenseEngine::new(x, n, &setup, Array1::zeros(0))
        })
    }

    /// Minimizes a sparse objective, lazily when configured.
    pub fn run_sparse<O>(&mut self, objective: &O, n: usize, x0: Array1<f64>) -> std::result::Result<Solution, Failure>
    where
        O: Objective<SparseVector> + Clone + Send,
    {
        let plan = match self.plan(n, x0.len()) {
            Ok(plan) => plan,
            Err(e) => return Err(Failure::new(e, x0, self.config.seed)),
        };
        let setup = plan.setup.clone();
        self.run_pool::<SparseVector, _, _, _>(plan, objective, n, x0, |x| {
            SparseEngine::new(x, n, &setup, Array1::zeros(0))
        })
    }

    fn run_pool<V, E, O, F>(
        &mut self,
        plan: PoolPlan,
        objective: &O,
        n: usize,
        x0: Array1<f64>,
        make_engine: F,
    ) -> std::result::Result<Solution, Failure>
    where
        E: EpochRunner<V> + Send,
        O: Objective<V> + Clone + Send,
        F: Fn(Array1<f64>) -> E,
    {
        let PoolPlan { setup, workers: p, merge } = plan;
        let pool = match ThreadPoolBuilder::new().num_threads(thread_count(p)).build() {
            Ok(pool) => pool,
            Err(e) => return Err(Failure::new(SagaError::from(e), x0, setup.seed)),
        };
        let blocks = partition(n, p);
        info!(
            "parallel SAGA: n = {n}, d = {}, {p} workers, {merge:?} merge, regularizer = {:?}",
            x0.len(),
            setup.regularizer
        );

        let mut workers: Vec<Worker<V, E, O>> = blocks
            .iter()
            .map(|block| Worker {
                engine: make_engine(x0.clone()),
                objective: objective.clone(),
                block: block.clone(),
                draws: Vec::with_capacity(block.len()),
                _direction: PhantomData,
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(setup.seed);
        let mut merged = x0;
        let mut snapshot = merged.clone();

        let result = drive_pool(
            &pool,
            &mut workers,
            &blocks,
            n,
            &setup,
            merge,
            self.hook.as_mut(),
            &mut merged,
            &mut snapshot,
            &mut rng,
        );
        let seed = rng.gen::<u64>();
        match result {
            Ok(outcome) => {
                info!(
                    "parallel SAGA finished: {:?} after {} epochs ({} iterations)",
                    outcome.termination, outcome.epochs, outcome.iterations
                );
                Ok(Solution {
                    x: merged,
                    seed,
                    epochs: outcome.epochs,
                    iterations: outcome.iterations,
                    termination: outcome.termination,
                })
            }
            Err(Fault::Current(e)) => Err(Failure::new(e, merged, seed)),
            Err(Fault::Snapshot(e)) => Err(Failure::new(e, snapshot, seed)),
        }
    }
}

/// Worker results are inspected in worker order, so the reported error is deterministic.
fn first_error<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    results.into_iter().collect()
}

#[allow(clippy::too_many_arguments)]
fn drive_pool<V, E, O>(
    pool: &ThreadPool,
    workers: &mut [Worker<V, E, O>],
    blocks: &[Range<usize>],
    n: usize,
    setup: &Setup,
    merge: MergeRule,
    mut hook: Option<&mut Hook>,
    merged: &mut Array1<f64>,
    snapshot: &mut Array1<f64>,
    rng: &mut StdRng,
) -> std::result::Result<Outcome, Fault>
where
    E: EpochRunner<V> + Send,
    O: Objective<V> + Send,
{
    let init = pool.install(|| workers.par_iter_mut().map(|w| w.initialize()).collect::<Vec<_>>());
    first_error(init).map_err(Fault::Current)?;

    let mut quota = Vec::with_capacity(workers.len());
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
        quotas(blocks, n, budget, &mut quota);

        snapshot.assign(&*merged);
        // all draws happen here, on the driving thread, in worker order
        for (w, &q) in workers.iter_mut().zip(&quota) {
            w.engine.set_iterate(merged.view());
            w.draws.clear();
            let (start, len) = (w.block.start, w.block.len());
            w.draws.extend((0..q).map(|_| start + rng.gen_range(0..len)));
        }

        trace!("dispatching epoch {epochs} to {} workers, draws {quota:?}", workers.len());
        let steps = pool.install(|| workers.par_iter_mut().map(|w| w.run_epoch()).collect::<Vec<_>>());
        iterations += first_error(steps).map_err(Fault::Snapshot)?.iter().sum::<usize>();
        epochs += 1;

        match merge {
            MergeRule::Mean => ops::mean_into(workers.iter().map(|w| w.engine.iterate().view()), merged),
            MergeRule::Median => {
                let views: Vec<ArrayView1<'_, f64>> = workers.iter().map(|w| w.engine.iterate().view()).collect();
                ops::median_into(&views, merged);
            }
        }
        let value = workers.iter().map(|w| w.engine.last_value()).sum::<f64>() / workers.len() as f64;

        let closed = close_epoch(
            epochs - 1,
            snapshot.view(),
            merged.view(),
            value,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_cover_the_range_without_overlap() {
        let blocks = partition(10, 3);
        assert_eq!(blocks, vec![0..3, 3..6, 6..10]);
        let blocks = partition(5, 5);
        assert!(blocks.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn quotas_add_up_to_the_budget() {
        let blocks = partition(10, 3);
        let mut out = Vec::new();
        quotas(&blocks, 10, 10, &mut out);
        assert_eq!(out, vec![3, 3, 4]);
        quotas(&blocks, 10, 1, &mut out);
        assert_eq!(out, vec![1, 0, 0]);
        quotas(&blocks, 10, 7, &mut out);
        assert_eq!(out.iter().sum::<usize>(), 7);
    }

    #[test]
    fn threads_are_capped_at_the_global_pool_size() {
        let available = rayon::current_num_threads();
        assert_eq!(thread_count(10_000), available);
        assert_eq!(thread_count(1), 1);
        assert!(thread_count(2) <= 2);
    }
}
