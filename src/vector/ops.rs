//! # Vector Operations
//!
//! Reductions used by the stopping criterion and the worker merge, plus the
//! support merge used by the sparse engine.

use ndarray::{Array1, ArrayView1};

/// `max_i |x_i|`; NaN entries are ignored (callers check finiteness separately).
pub fn max_abs(x: ArrayView1<'_, f64>) -> f64 {
    x.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// `max_i |a_i - b_i|`.
pub fn max_abs_diff(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc, (x, y)| acc.max((x - y).abs()))
}

/// True if no entry is NaN or infinite.
pub fn all_finite(x: ArrayView1<'_, f64>) -> bool {
    x.iter().all(|v| v.is_finite())
}

/// Euclidean norm.
pub fn norm2(x: ArrayView1<'_, f64>) -> f64 {
    x.dot(&x).sqrt()
}

/// Writes the sorted union of two sorted index lists into `out`.
pub fn union_support(a: &[usize], b: &[usize], out: &mut Vec<usize>) {
    out.clear();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else if b[j] < a[i] {
            out.push(b[j]);
            j += 1;
        } else {
            out.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
}

/// Coordinate-wise mean of equally sized vectors, written into `target`.
pub fn mean_into<'a, I>(vectors: I, target: &mut Array1<f64>)
where
    I: IntoIterator<Item = ArrayView1<'a, f64>>,
{
    target.fill(0.0);
    let mut count = 0usize;
    for v in vectors {
        *target += &v;
        count += 1;
    }
    if count > 0 {
        target.mapv_inplace(|s| s / count as f64);
    }
}

/// Coordinate-wise median of equally sized vectors, written into `target`.
/// For an even count the two middle values are averaged.
pub fn median_into(vectors: &[ArrayView1<'_, f64>], target: &mut Array1<f64>) {
    let mut column = Vec::with_capacity(vectors.len());
    for (k, out) in target.iter_mut().enumerate() {
        column.clear();
        column.extend(vectors.iter().map(|v| v[k]));
        column.sort_by(|a, b| a.total_cmp(b));
        let m = column.len();
        *out = match m {
            0 => 0.0,
            _ if m % 2 == 1 => column[m / 2],
            _ => 0.5 * (column[m / 2 - 1] + column[m / 2]),
        };
    }
}
