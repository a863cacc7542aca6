//! # Utility Functions (`utils`)
//!
//! Helpers around the core solver; currently the shared-memory worker pool.

pub mod parallel;

pub use parallel::ParallelSaga;
