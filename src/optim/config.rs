//! # Configuration
//!
//! [`SagaConfig`] holds every serializable option and can be loaded from
//! JSON. Validation and regularizer selection happen once per run, before the
//! first sample is drawn, producing a [`Setup`] the engines consume.

use super::jit::{IdentityJit, JitOperator, L1Jit, TikhonovJit};
use super::proximal::{L1Proximal, L2Proximal, ProximalOperator, TikhonovProximal};
use crate::error::{Result, SagaError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn default_epsilon() -> f64 {
    1e-8
}

/// How the worker pool reduces local iterates at an epoch boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRule {
    /// Coordinate-wise mean; cheapest.
    #[default]
    Mean,
    /// Coordinate-wise median; tolerates a single misbehaving worker.
    Median,
}

/// Options of a SAGA run.
///
/// # Example
///
/// ```json
/// {
///   "gamma": 0.05,
///   "epsilon": 1e-8,
///   "max_epochs": 1000,
///   "l1": 0.4,
///   "lazy_updates": true
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SagaConfig {
    /// Step size; required.
    pub gamma: f64,
    /// Relative-change tolerance, scaled by `gamma` before use.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub max_epochs: Option<usize>,
    /// Cap on the total number of sample draws.
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub l1: Option<f64>,
    #[serde(default)]
    pub l2: Option<f64>,
    #[serde(default)]
    pub tikhonov: Option<f64>,
    /// Sparse path only: apply drift and regularization lazily.
    ///
    /// The objective must return fixed feature directions
    /// ([`Evaluation::fixed`](crate::optim::Evaluation::fixed)) and read only
    /// the coordinates in their support; a full gradient fails the run with
    /// [`SagaError::Config`].
    #[serde(default)]
    pub lazy_updates: bool,
    /// Worker pool size; defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub merge: MergeRule,
}

impl SagaConfig {
    pub fn new(gamma: f64) -> Self {
        SagaConfig {
            gamma,
            epsilon: default_epsilon(),
            max_epochs: None,
            max_iterations: None,
            seed: 0,
            l1: None,
            l2: None,
            tikhonov: None,
            lazy_updates: false,
            workers: None,
            merge: MergeRule::Mean,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = Some(max_epochs);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_l1(mut self, lambda: f64) -> Self {
        self.l1 = Some(lambda);
        self
    }

    pub fn with_l2(mut self, lambda: f64) -> Self {
        self.l2 = Some(lambda);
        self
    }

    pub fn with_tikhonov(mut self, lambda: f64) -> Self {
        self.tikhonov = Some(lambda);
        self
    }

    pub fn with_lazy_updates(mut self, lazy: bool) -> Self {
        self.lazy_updates = lazy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_merge(mut self, merge: MergeRule) -> Self {
        self.merge = merge;
        self
    }
}

// --- Regularizer Selection ---

/// The single active regularizer of a run, resolved once at setup.
#[derive(Clone, Debug)]
pub enum Regularizer {
    None,
    L1(f64),
    L2(f64),
    Tikhonov(f64),
    /// Caller-supplied proximal map, used with the lambda it carries.
    Proximal(Arc<dyn ProximalOperator>),
    /// Caller-supplied lazy operator, used with the lambda it carries.
    Jit(Arc<dyn JitOperator>),
}

/// How an engine turns the pre-proximal point into the next iterate.
#[derive(Clone, Debug)]
pub(crate) enum StepRule {
    Plain,
    Proximal(Arc<dyn ProximalOperator>),
    Lazy(Arc<dyn JitOperator>),
}

/// Validated run parameters shared by the drivers.
#[derive(Clone, Debug)]
pub(crate) struct Setup {
    pub gamma: f64,
    /// `epsilon * gamma`.
    pub tolerance: f64,
    pub max_epochs: usize,
    pub max_iterations: usize,
    pub seed: u64,
    pub regularizer: Regularizer,
    pub rule: StepRule,
    /// Unscaled regularization constant reported to the hook.
    pub raw_lambda: f64,
}

fn check_constant(name: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(SagaError::config(format!(
            "invalid {name}-regularization constant {v}: must be finite and non-negative"
        ))),
        Some(v) if v != 0.0 => Ok(Some(v)),
        _ => Ok(None),
    }
}

fn rescaled<T>(mut op: T, gamma: f64, n: usize) -> T
where
    T: ProximalOperator,
{
    op.set_lambda(gamma * op.lambda() / n as f64);
    op
}

fn rescaled_jit<T>(mut op: T, gamma: f64, n: usize) -> T
where
    T: JitOperator,
{
    op.set_lambda(gamma * op.lambda() / n as f64);
    op
}

impl Setup {
    /// Validates `config` for `n` samples in dimension `d` and selects the step rule.
    pub fn new(
        config: &SagaConfig,
        proximal: Option<&Arc<dyn ProximalOperator>>,
        jit: Option<&Arc<dyn JitOperator>>,
        n: usize,
        d: usize,
    ) -> Result<Self> {
        if !config.gamma.is_finite() || config.gamma <= 0.0 {
            return Err(SagaError::config(format!(
                "step size gamma must be positive and finite, got {}",
                config.gamma
            )));
        }
        if !(config.epsilon >= 0.0) {
            return Err(SagaError::config(format!(
                "epsilon must be non-negative, got {}",
                config.epsilon
            )));
        }
        if n == 0 {
            return Err(SagaError::config("objective has no samples"));
        }
        if d == 0 {
            return Err(SagaError::config("initial point is empty"));
        }
        if config.workers == Some(0) {
            return Err(SagaError::config("worker count must be at least one"));
        }

        let l1 = check_constant("l1", config.l1)?;
        let l2 = check_constant("l2", config.l2)?;
        let tikhonov = check_constant("tikhonov", config.tikhonov)?;
        let shortcuts = [l1, l2, tikhonov].iter().filter(|v| v.is_some()).count();
        if shortcuts > 1 {
            return Err(SagaError::config(
                "at most one of l1, l2 and tikhonov regularization may be active",
            ));
        }
        if proximal.is_some() && jit.is_some() {
            return Err(SagaError::config(
                "a proximal operator and a jit operator cannot be combined",
            ));
        }
        if (proximal.is_some() || jit.is_some()) && shortcuts > 0 {
            return Err(SagaError::config(
                "an explicit operator cannot be combined with a regularization constant",
            ));
        }
        if config.lazy_updates && l2.is_some() {
            return Err(SagaError::config(
                "l2 (group) regularization is not separable and has no lazy form",
            ));
        }
        if config.lazy_updates && proximal.is_some() {
            return Err(SagaError::config(
                "lazy updates need a jit operator, not a proximal operator",
            ));
        }

        let regularizer = if let Some(op) = jit {
            Regularizer::Jit(Arc::clone(op))
        } else if let Some(op) = proximal {
            Regularizer::Proximal(Arc::clone(op))
        } else if let Some(v) = l1 {
            Regularizer::L1(v)
        } else if let Some(v) = l2 {
            Regularizer::L2(v)
        } else if let Some(v) = tikhonov {
            Regularizer::Tikhonov(v)
        } else {
            Regularizer::None
        };

        let gamma = config.gamma;
        let lazy = config.lazy_updates;
        // built-in constants are rescaled to gamma * lambda / n exactly here
        let rule = match &regularizer {
            Regularizer::None if lazy => StepRule::Lazy(Arc::new(IdentityJit)),
            Regularizer::None => StepRule::Plain,
            Regularizer::L1(v) if lazy => StepRule::Lazy(Arc::new(rescaled_jit(L1Jit::new(*v), gamma, n))),
            Regularizer::L1(v) => StepRule::Proximal(Arc::new(rescaled(L1Proximal::new(*v), gamma, n))),
            Regularizer::L2(v) => StepRule::Proximal(Arc::new(rescaled(L2Proximal::new(*v), gamma, n))),
            Regularizer::Tikhonov(v) if lazy => {
                StepRule::Lazy(Arc::new(rescaled_jit(TikhonovJit::new(*v), gamma, n)))
            }
            Regularizer::Tikhonov(v) => {
                StepRule::Proximal(Arc::new(rescaled(TikhonovProximal::new(*v), gamma, n)))
            }
            Regularizer::Proximal(op) => StepRule::Proximal(Arc::clone(op)),
            Regularizer::Jit(op) => StepRule::Lazy(Arc::clone(op)),
        };
        let raw_lambda = match &regularizer {
            Regularizer::None => 0.0,
            Regularizer::L1(v) | Regularizer::L2(v) | Regularizer::Tikhonov(v) => *v,
            Regularizer::Proximal(op) => n as f64 * op.lambda() / gamma,
            Regularizer::Jit(op) => n as f64 * op.lambda() / gamma,
        };

        Ok(Setup {
            gamma,
            tolerance: config.epsilon * gamma,
            max_epochs: config.max_epochs.unwrap_or(usize::MAX),
            max_iterations: config.max_iterations.unwrap_or(usize::MAX),
            seed: config.seed,
            regularizer,
            rule,
            raw_lambda,
        })
    }

    /// The dense engine has no lazy path.
    pub fn require_eager(&self) -> Result<()> {
        match self.rule {
            StepRule::Lazy(_) => Err(SagaError::config(
                "lazy (jit) updates are only available for sparse objectives",
            )),
            _ => Ok(()),
        }
    }
}
