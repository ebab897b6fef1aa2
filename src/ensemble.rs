//! Trajectory ensemble storage
//!
//! Row-major realizations × time-steps matrix of nucleus counts.

use serde::Serialize;

use crate::{DecayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrajectoryEnsemble {
    n_realizations: usize,
    n_steps: usize,
    counts: Vec<u64>,
}

impl TrajectoryEnsemble {
    /// Ensemble with every entry set to zero.
    pub fn zeros(n_realizations: usize, n_steps: usize) -> Self {
        Self {
            n_realizations,
            n_steps,
            counts: vec![0; n_realizations * n_steps],
        }
    }

    /// Build from per-realization rows, which must all share one length.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Result<Self> {
        let n_steps = rows.first().map_or(0, Vec::len);
        let mut counts = Vec::with_capacity(rows.len() * n_steps);
        for row in &rows {
            if row.len() != n_steps {
                return Err(DecayError::LengthMismatch {
                    context: "ensemble row",
                    expected: n_steps,
                    got: row.len(),
                });
            }
            counts.extend_from_slice(row);
        }

        Ok(Self {
            n_realizations: rows.len(),
            n_steps,
            counts,
        })
    }

    pub fn n_realizations(&self) -> usize {
        self.n_realizations
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn get(&self, realization: usize, step: usize) -> u64 {
        self.counts[realization * self.n_steps + step]
    }

    pub(crate) fn set(&mut self, realization: usize, step: usize, value: u64) {
        self.counts[realization * self.n_steps + step] = value;
    }

    /// One sample path.
    pub fn row(&self, realization: usize) -> &[u64] {
        let start = realization * self.n_steps;
        &self.counts[start..start + self.n_steps]
    }

    pub(crate) fn row_mut(&mut self, realization: usize) -> &mut [u64] {
        let start = realization * self.n_steps;
        &mut self.counts[start..start + self.n_steps]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u64]> {
        // chunks_exact panics on 0, and an empty-step ensemble has no rows to yield
        self.counts
            .chunks_exact(self.n_steps.max(1))
            .take(self.n_realizations)
    }

    /// Counts of every realization at one time step.
    pub fn column(&self, step: usize) -> Vec<u64> {
        (0..self.n_realizations)
            .map(|r| self.get(r, step))
            .collect()
    }

    /// Per-step ensemble mean.
    pub fn mean(&self) -> Vec<f64> {
        if self.n_realizations == 0 {
            return vec![f64::NAN; self.n_steps];
        }

        let mut sums = vec![0.0; self.n_steps];
        for row in self.rows() {
            for (sum, &count) in sums.iter_mut().zip(row) {
                *sum += count as f64;
            }
        }
        let n = self.n_realizations as f64;
        sums.into_iter().map(|s| s / n).collect()
    }
}
