//! # Stopping Criterion
//!
//! Relative-change test between two iterates, evaluated once per epoch.

use crate::error::{Result, SagaError};
use crate::vector::ops;
use ndarray::ArrayView1;

/// Outcome of one stopping check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopCheck {
    pub converged: bool,
    /// `max|x_new − x_old| / max|x_new|` (infinite when the new iterate is zero but moved).
    pub delta: f64,
}

/// Compares `x_old` and `x_new` against the (already `gamma`-scaled) tolerance.
///
/// Converged iff `max_delta / max_x <= epsilon` with `max_x != 0`, or both
/// are zero. Fails with [`SagaError::Numeric`] if either iterate holds a NaN
/// or an infinity.
pub fn evaluate(x_old: ArrayView1<'_, f64>, x_new: ArrayView1<'_, f64>, epsilon: f64) -> Result<StopCheck> {
    if !ops::all_finite(x_new) || !ops::all_finite(x_old) {
        return Err(SagaError::Numeric("iterate is not finite".into()));
    }
    let max_x = ops::max_abs(x_new);
    let max_delta = ops::max_abs_diff(x_new, x_old);
    let check = if max_x != 0.0 {
        let delta = max_delta / max_x;
        StopCheck {
            converged: delta <= epsilon,
            delta,
        }
    } else if max_delta == 0.0 {
        StopCheck {
            converged: true,
            delta: 0.0,
        }
    } else {
        StopCheck {
            converged: false,
            delta: f64::INFINITY,
        }
    };
    Ok(check)
}
