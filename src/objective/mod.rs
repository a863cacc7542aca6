//! # Objectives
//!
//! Ready-made [`Objective`](crate::optim::Objective) implementations. Any
//! closure `FnMut(usize, &Array1<f64>) -> Result<Evaluation<V>, BoxError>`
//! works as well; these exist for the common generalized-linear case.

pub mod logistic;

pub use logistic::{LogisticRegression, ObjectiveError};
