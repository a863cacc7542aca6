//! Convergence of the sequential driver on the logistic-regression fixture.
//!
//! Regularized runs are checked through their optimality conditions: SAGA
//! minimizes `(1/n) Σ f_i(x) + (λ/n) R(x)`, so at the solution the mean
//! gradient equals `−(λ/n) sign(x)` for L1 and `−(λ/n) x` for Tikhonov.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use ndarray::Array1;
use rsaga::optim::{L1Proximal, Saga, SagaConfig, Termination};

const LAMBDA: f64 = 0.4;

fn config() -> SagaConfig {
    SagaConfig::new(FIXTURE_GAMMA).with_epsilon(1e-8)
}

mod unregularized {
    use super::*;

    #[test]
    fn dense_converges_to_the_fixture_optimum() {
        init_logger();
        let mut objective = fixture_dense();
        let solution = Saga::new(config())
            .run_dense(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert_close(&solution.x, &FIXTURE_OPTIMUM, 1e-4);
        let g = objective.gradient(&solution.x);
        assert!(g.iter().all(|v| v.abs() < 1e-6), "gradient {g} not small");
    }

    #[test]
    fn sparse_converges_to_the_fixture_optimum() {
        init_logger();
        let mut objective = fixture_sparse();
        let solution = Saga::new(config())
            .run_sparse(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert_close(&solution.x, &FIXTURE_OPTIMUM, 1e-4);
    }

    #[test]
    fn dense_and_sparse_follow_the_same_trajectory() {
        let dense = Saga::new(config().with_max_epochs(25))
            .run_dense(&mut fixture_dense(), 20, Array1::zeros(3))
            .unwrap();
        let sparse = Saga::new(config().with_max_epochs(25))
            .run_sparse(&mut fixture_sparse(), 20, Array1::zeros(3))
            .unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(dense.x[k], sparse.x[k], epsilon = 1e-10);
        }
        assert_eq!(dense.seed, sparse.seed);
    }

    #[test]
    fn restarting_from_the_solution_converges_immediately() {
        let mut objective = fixture_dense();
        let first = Saga::new(config())
            .run_dense(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        let again = Saga::new(config().with_seed(first.seed))
            .run_dense(&mut objective, 20, first.x.clone())
            .unwrap();
        assert_eq!(again.termination, Termination::Converged);
        assert!(again.epochs <= 5, "took {} epochs", again.epochs);
        assert_close(&again.x, first.x.as_slice().unwrap(), 1e-6);
    }
}

mod regularized {
    use super::*;

    fn l1_residual(x: &Array1<f64>, g: &Array1<f64>) -> f64 {
        x.iter()
            .zip(g)
            .map(|(&xk, &gk)| {
                if xk != 0.0 {
                    (gk + LAMBDA / 20.0 * xk.signum()).abs()
                } else {
                    (gk.abs() - LAMBDA / 20.0).max(0.0)
                }
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn l1_satisfies_optimality_conditions() {
        init_logger();
        let mut objective = fixture_dense();
        let solution = Saga::new(config().with_l1(LAMBDA))
            .run_dense(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        let g = objective.gradient(&solution.x);
        assert!(l1_residual(&solution.x, &g) < 1e-6);
        assert_close(&solution.x, &FIXTURE_L1_OPTIMUM, 1e-4);
    }

    #[test]
    fn tikhonov_satisfies_optimality_conditions() {
        let mut objective = fixture_sparse();
        let solution = Saga::new(config().with_tikhonov(LAMBDA))
            .run_sparse(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        let g = objective.gradient(&solution.x);
        for k in 0..3 {
            assert_abs_diff_eq!(g[k] + LAMBDA / 20.0 * solution.x[k], 0.0, epsilon = 1e-6);
        }
        assert_close(&solution.x, &FIXTURE_TIKHONOV_OPTIMUM, 1e-4);
    }

    #[test]
    fn custom_proximal_operator_uses_its_own_lambda() {
        // the per-step lambda the l1 shortcut would derive: gamma * 0.4 / 20
        let op = L1Proximal::new(FIXTURE_GAMMA * LAMBDA / 20.0);
        let custom = Saga::new(config().with_max_epochs(40))
            .with_proximal_operator(op)
            .run_dense(&mut fixture_dense(), 20, Array1::zeros(3))
            .unwrap();
        let shortcut = Saga::new(config().with_max_epochs(40).with_l1(LAMBDA))
            .run_dense(&mut fixture_dense(), 20, Array1::zeros(3))
            .unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(custom.x[k], shortcut.x[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn group_l2_shrinks_towards_zero() {
        let mut objective = fixture_dense();
        let plain = Saga::new(config())
            .run_dense(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        let group = Saga::new(config().with_l2(LAMBDA))
            .run_dense(&mut objective, 20, Array1::zeros(3))
            .unwrap();
        assert_eq!(group.termination, Termination::Converged);
        let norm = |x: &Array1<f64>| x.dot(x).sqrt();
        assert!(norm(&group.x) < norm(&plain.x));
        // stationarity: g = −(λ/n) x / ‖x‖
        let g = objective.gradient(&group.x);
        let scale = LAMBDA / 20.0 / norm(&group.x);
        for k in 0..3 {
            assert_abs_diff_eq!(g[k] + scale * group.x[k], 0.0, epsilon = 1e-6);
        }
    }
}
