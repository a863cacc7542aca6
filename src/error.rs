//! # Error Handling
//!
//! Error taxonomy shared by the sequential driver and the worker pool.
//! Every fatal condition unwinds to the caller as a [`Failure`], which pairs
//! the typed error with the best iterate known at the time.

use ndarray::Array1;

/// Error type returned by objective callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by the internal engines.
pub type Result<T> = std::result::Result<T, SagaError>;

#[derive(thiserror::Error, Debug)]
pub enum SagaError {
    /// Invalid or conflicting options, detected before any sampling.
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Could not parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The objective callback failed at `index`.
    #[error("Objective evaluation failed at sample {index}: {source}")]
    Evaluation {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("Dimension mismatch at sample {index}: expected {expected}, got {got}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
    /// Malformed sparse input: index/value length mismatch or unsorted indices.
    #[error("Invalid sparse vector: {0}")]
    InvalidSparseVector(String),
    #[error("Index out of bounds: index {index} for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    /// A NaN showed up in a gradient weight or an iterate coordinate.
    #[error("Numerical error: {0}")]
    Numeric(String),
    #[error("Could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SagaError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SagaError::Config(msg.into())
    }
}

/// A failed run: the error plus the partial result the run had reached.
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct Failure {
    #[source]
    pub error: SagaError,
    /// Last good iterate (the initial point for configuration errors).
    pub x: Array1<f64>,
    /// Advanced RNG seed, usable to resume a deterministic sequence.
    pub seed: u64,
}

impl Failure {
    pub(crate) fn new(error: SagaError, x: Array1<f64>, seed: u64) -> Self {
        Failure { error, x, seed }
    }
}
