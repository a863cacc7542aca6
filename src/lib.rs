//! # rsaga Core Library
//!
//! SAGA, a variance-reduced stochastic gradient method, for finite-sum
//! objectives `(1/n) Σ f_i(x) + R(x)`:
//!
//! * dense and sparse core loops with a per-sample gradient cache,
//! * proximal regularization (L1, group L2, Tikhonov) or custom operators,
//! * lazy "just-in-time" regularization on the sparse path,
//! * a data-parallel worker pool merging local iterates by mean or median.
//!
//! ```no_run
//! use ndarray::array;
//! use rsaga::objective::LogisticRegression;
//! use rsaga::optim::{Saga, SagaConfig};
//!
//! let features = vec![array![1.0, 0.5], array![1.0, -1.5], array![1.0, 2.0]];
//! let mut objective = LogisticRegression::new(features, vec![1.0, 0.0, 1.0]).unwrap();
//! let mut saga = Saga::new(SagaConfig::new(0.1).with_tikhonov(0.1));
//! let solution = saga.run_dense(&mut objective, 3, array![0.0, 0.0]).unwrap();
//! println!("x = {} ({:?})", solution.x, solution.termination);
//! ```

pub mod error;
pub mod objective;
pub mod optim;
pub mod utils;
pub mod vector;

pub use error::{Failure, SagaError};
pub use optim::{Evaluation, Objective, Saga, SagaConfig, Solution, Termination};
pub use utils::ParallelSaga;
pub use vector::SparseVector;
