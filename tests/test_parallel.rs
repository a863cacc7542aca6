//! Worker pool: single-worker equivalence with the sequential driver,
//! convergence of the mean and median merges on a problem whose blocks share
//! one minimizer, hooks and custom operators.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use ndarray::Array1;
use rsaga::error::BoxError;
use rsaga::optim::{Evaluation, HookInfo, L1Jit, L1Proximal, MergeRule, Saga, SagaConfig, Termination};
use rsaga::{ParallelSaga, SagaError};
use std::sync::{mpsc, Arc};

type DenseResult = Result<Evaluation<Array1<f64>>, BoxError>;

/// `½ (a_i·x − b_i)²` with the rows shared between worker clones.
fn least_squares(n: usize) -> impl FnMut(usize, &Array1<f64>) -> DenseResult + Clone + Send {
    let (rows, targets) = consistent_system(n, 1);
    let rows: Arc<Vec<Arc<Array1<f64>>>> = Arc::new(rows.into_iter().map(Arc::new).collect());
    let targets = Arc::new(targets);
    move |i: usize, x: &Array1<f64>| -> DenseResult {
        let a = &rows[i];
        let r = a.dot(x) - targets[i];
        Ok(Evaluation::fixed(0.5 * r * r, r, i, Arc::clone(a)))
    }
}

mod equivalence {
    use super::*;

    #[test]
    fn single_worker_reproduces_the_sequential_dense_run() {
        init_logger();
        let config = SagaConfig::new(FIXTURE_GAMMA).with_seed(42).with_workers(1);
        let sequential = Saga::new(config.clone())
            .run_dense(&mut fixture_dense(), 20, Array1::zeros(3))
            .unwrap();
        let pooled = ParallelSaga::new(config)
            .run_dense(&fixture_dense(), 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(pooled.x, sequential.x);
        assert_eq!(pooled.seed, sequential.seed);
        assert_eq!(pooled.epochs, sequential.epochs);
        assert_eq!(pooled.termination, Termination::Converged);
    }

    #[test]
    fn single_worker_reproduces_the_sequential_lazy_run() {
        let config = SagaConfig::new(0.1)
            .with_l1(0.3)
            .with_lazy_updates(true)
            .with_max_epochs(30)
            .with_max_iterations(700)
            .with_workers(1);
        let sequential = Saga::new(config.clone())
            .run_sparse(&mut synthetic_sparse(30, 12, 3, 17), 30, Array1::zeros(12))
            .unwrap();
        let pooled = ParallelSaga::new(config)
            .run_sparse(&synthetic_sparse(30, 12, 3, 17), 30, Array1::zeros(12))
            .unwrap();
        assert_eq!(pooled.x, sequential.x);
        assert_eq!(pooled.seed, sequential.seed);
        assert_eq!(pooled.iterations, sequential.iterations);
        assert_eq!(pooled.termination, sequential.termination);
    }
}

mod merge {
    use super::*;

    fn pooled(workers: usize, merge: MergeRule) {
        init_logger();
        let config = SagaConfig::new(0.1)
            .with_epsilon(1e-12)
            .with_workers(workers)
            .with_merge(merge)
            .with_max_epochs(5_000)
            .with_seed(workers as u64);
        let solution = ParallelSaga::new(config)
            .run_dense(&least_squares(40), 40, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert_close(&solution.x, &[1.0, -2.0, 0.5], 1e-6);
    }

    #[test]
    fn mean_merge_converges() {
        pooled(4, MergeRule::Mean);
    }

    #[test]
    fn median_merge_converges() {
        pooled(3, MergeRule::Median);
    }

    /// One sample per worker: the mean merge is a full gradient step.
    #[test]
    fn worker_count_is_capped_at_the_sample_count() {
        let config = SagaConfig::new(0.5)
            .with_epsilon(1e-12)
            .with_workers(64)
            .with_max_epochs(5_000);
        let solution = ParallelSaga::new(config)
            .run_dense(&least_squares(8), 8, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert_close(&solution.x, &[1.0, -2.0, 0.5], 1e-6);
    }

    /// Forty single-sample workers, more than the threads backing them.
    #[test]
    fn workers_outnumbering_threads_share_the_pool() {
        let config = SagaConfig::new(0.5)
            .with_epsilon(1e-12)
            .with_workers(40)
            .with_max_epochs(5_000);
        let solution = ParallelSaga::new(config)
            .run_dense(&least_squares(40), 40, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert_close(&solution.x, &[1.0, -2.0, 0.5], 1e-6);
    }

    #[test]
    fn iteration_budget_is_split_across_workers() {
        let config = SagaConfig::new(0.1).with_workers(3).with_max_iterations(50);
        let solution = ParallelSaga::new(config)
            .run_dense(&least_squares(40), 40, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::MaxIterations);
        assert_eq!(solution.iterations, 50);
        assert_eq!(solution.epochs, 2);
    }
}

mod attachments {
    use super::*;

    const N: usize = 30;
    const D: usize = 12;

    /// Runs the pool with a hook recording `(epoch, lambda, value)` and
    /// stopping after `stop_after`.
    fn hooked(pool: ParallelSaga, stop_after: usize) -> (rsaga::Solution, Vec<(usize, f64, f64)>) {
        let (tx, rx) = mpsc::channel();
        let mut pool = pool.with_hook(move |info: &HookInfo<'_>| {
            tx.send((info.epoch, info.lambda, info.value)).unwrap();
            info.epoch == stop_after
        });
        let solution = pool
            .run_sparse(&synthetic_sparse(N, D, 3, 17), N, Array1::zeros(D))
            .unwrap();
        (solution, rx.try_iter().collect())
    }

    #[test]
    fn hook_stops_the_pool_at_an_epoch_boundary() {
        init_logger();
        let config = SagaConfig::new(0.1).with_l1(0.4).with_workers(2).with_seed(1);
        let (solution, seen) = hooked(ParallelSaga::new(config), 1);
        assert_eq!(solution.termination, Termination::HookStop);
        assert_eq!(solution.epochs, 2);
        assert_eq!(solution.iterations, 2 * N);
        assert_eq!(seen.iter().map(|s| s.0).collect::<Vec<_>>(), vec![0, 1]);
        for &(_, lambda, value) in &seen {
            assert_eq!(lambda, 0.4);
            // mean logistic loss of the last draws, always positive
            assert!(value.is_finite() && value > 0.0);
        }
    }

    #[test]
    fn hook_reports_the_raw_lambda_of_a_custom_operator() {
        let op = L1Proximal::new(0.1 * 0.4 / N as f64);
        let pool = ParallelSaga::new(SagaConfig::new(0.1).with_workers(2)).with_proximal_operator(op);
        let (_, seen) = hooked(pool, 0);
        assert_eq!(seen.len(), 1);
        assert_abs_diff_eq!(seen[0].1, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn custom_jit_operator_matches_the_lazy_l1_shortcut() {
        let base = SagaConfig::new(0.1)
            .with_workers(3)
            .with_merge(MergeRule::Median)
            .with_max_epochs(20)
            .with_seed(4);
        let objective = synthetic_sparse(N, D, 3, 17);
        let shortcut = ParallelSaga::new(base.clone().with_l1(0.3).with_lazy_updates(true))
            .run_sparse(&objective, N, Array1::zeros(D))
            .unwrap();
        let custom = ParallelSaga::new(base)
            .with_jit_operator(L1Jit::new(0.1 * 0.3 / N as f64))
            .run_sparse(&objective, N, Array1::zeros(D))
            .unwrap();
        assert_eq!(custom.epochs, shortcut.epochs);
        assert_close(&custom.x, shortcut.x.as_slice().unwrap(), 1e-12);
    }
}

mod failures {
    use super::*;

    #[test]
    fn worker_error_returns_the_pre_epoch_merge() {
        let mut inner = least_squares(12);
        let failing = move |i: usize, x: &Array1<f64>| -> DenseResult {
            if i == 7 && x.iter().any(|&v| v != 0.0) {
                return Err("sample 7 unavailable".into());
            }
            inner(i, x)
        };
        let config = SagaConfig::new(0.1).with_workers(2).with_seed(5);
        let failure = ParallelSaga::new(config)
            .run_dense(&failing, 12, Array1::zeros(3))
            .unwrap_err();
        assert!(matches!(failure.error, SagaError::Evaluation { index: 7, .. }));
        assert!(failure.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn lazy_updates_need_a_sparse_objective() {
        let config = SagaConfig::new(0.1).with_lazy_updates(true).with_seed(9);
        let failure = ParallelSaga::new(config)
            .run_dense(&least_squares(4), 4, Array1::from(vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(failure.error, SagaError::Config(_)));
        assert_eq!(failure.x, Array1::from(vec![1.0, 2.0, 3.0]));
        assert_eq!(failure.seed, 9);
    }
}
