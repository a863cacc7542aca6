//! # Gradient Cache
//!
//! Per-sample memo of the most recent gradient record together with the
//! running sum `s = Σ_i weight_i · direction_i` over all populated entries.
//! The cache is preallocated to `n` slots and never resized; a worker only
//! ever writes the slots of its own block.

use super::Direction;
use crate::error::{Result, SagaError};
use crate::vector::DirectionVector;
use ndarray::Array1;

/// Cached gradient of one sample: `weight * direction`.
#[derive(Debug)]
pub struct GradientRecord<V> {
    pub weight: f64,
    pub direction: Direction<V>,
}

impl<V> Clone for GradientRecord<V> {
    fn clone(&self) -> Self {
        GradientRecord {
            weight: self.weight,
            direction: self.direction.clone(),
        }
    }
}

#[derive(Debug)]
pub struct GradientCache<V> {
    records: Vec<Option<GradientRecord<V>>>,
    sum: Array1<f64>,
    populated: usize,
}

impl<V: DirectionVector> GradientCache<V> {
    /// Creates an empty cache for `n` samples in dimension `d`.
    pub fn new(n: usize, d: usize) -> Self {
        GradientCache {
            records: (0..n).map(|_| None).collect(),
            sum: Array1::zeros(d),
            populated: 0,
        }
    }

    /// Number of slots (`n`).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of slots holding a record; the divisor of the gradient average.
    pub fn populated(&self) -> usize {
        self.populated
    }

    pub fn get(&self, index: usize) -> Option<&GradientRecord<V>> {
        self.records.get(index).and_then(|r| r.as_ref())
    }

    /// The maintained running sum `s`.
    pub fn running_sum(&self) -> &Array1<f64> {
        &self.sum
    }

    /// Stores `record` at `index` and updates the running sum by the difference
    /// to the previous record. Returns the replaced record, if any.
    pub fn insert(&mut self, index: usize, record: GradientRecord<V>) -> Result<Option<GradientRecord<V>>> {
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(index)
            .ok_or(SagaError::IndexOutOfBounds { index, len })?;
        match slot {
            Some(old) if old.direction.key().same_as(&record.direction.key()) => {
                record
                    .direction
                    .values()
                    .scaled_add_to(record.weight - old.weight, &mut self.sum);
            }
            Some(old) => {
                old.direction.values().scaled_add_to(-old.weight, &mut self.sum);
                record.direction.values().scaled_add_to(record.weight, &mut self.sum);
            }
            None => {
                record.direction.values().scaled_add_to(record.weight, &mut self.sum);
                self.populated += 1;
            }
        }
        Ok(slot.replace(record))
    }

    /// Recomputes `Σ weight_i · direction_i` from scratch.
    pub fn recompute_sum(&self) -> Array1<f64> {
        let mut sum = Array1::zeros(self.sum.len());
        for record in self.records.iter().flatten() {
            record.direction.values().scaled_add_to(record.weight, &mut sum);
        }
        sum
    }
}
