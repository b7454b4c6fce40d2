use super::{ExperienceStore, MinTree, ReplayBuffer, SampledBatch, StoreError, SumTree, Transition};
use crate::Prng;
use rand::Rng;

/// Proportional prioritized experience replay.
///
/// Transitions are sampled with probability proportional to `priority^alpha`.
/// See "Prioritized Experience Replay" by Schaul et al. (2015).
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedReplayBuffer {
    buffer: ReplayBuffer,
    alpha: f64,
    sums: SumTree,
    mins: MinTree,
    /// Largest priority seen so far; assigned to new transitions.
    max_priority: f64,
}

impl PrioritizedReplayBuffer {
    /// Create an empty buffer. Fails unless `alpha` is non-negative and finite.
    pub fn new(capacity: usize, alpha: f64) -> Result<Self, StoreError> {
        if !(alpha >= 0.0 && alpha.is_finite()) {
            return Err(StoreError::InvalidAlpha(alpha));
        }
        let buffer = ReplayBuffer::new(capacity);
        Ok(Self {
            sums: SumTree::new(buffer.capacity()),
            mins: MinTree::new(buffer.capacity()),
            buffer,
            alpha,
            max_priority: 1.0,
        })
    }

    fn set_priority(&mut self, index: usize, priority: f64) {
        let weighted = priority.powf(self.alpha);
        self.sums.set(index, weighted);
        self.mins.set(index, weighted);
    }

    /// Sample indices proportionally, one from each of `batch_size` equal segments.
    fn sample_proportional(&self, batch_size: usize, rng: &mut Prng) -> Vec<usize> {
        let len = self.buffer.len();
        let segment = self.sums.sum(0, len) / batch_size as f64;
        (0..batch_size)
            .map(|i| {
                let mass = (i as f64 + rng.gen::<f64>()) * segment;
                self.sums.find_prefix_sum_index(mass).min(len - 1)
            })
            .collect()
    }
}

impl ExperienceStore for PrioritizedReplayBuffer {
    fn add(&mut self, transition: Transition) {
        let index = self.buffer.insert(transition);
        self.set_priority(index, self.max_priority);
    }

    fn sample(
        &self,
        batch_size: usize,
        beta: Option<f64>,
        rng: &mut Prng,
    ) -> Result<SampledBatch, StoreError> {
        let len = self.buffer.len();
        if len == 0 {
            return Err(StoreError::Empty);
        }
        let beta = beta.unwrap_or(1.0);
        let total = self.sums.total();
        let p_min = self.mins.min() / total;
        let max_weight = (p_min * len as f64).powf(-beta);

        let indices = self.sample_proportional(batch_size, rng);
        let mut batch = SampledBatch::with_capacity(batch_size);
        for &index in &indices {
            let p_sample = self.sums.get(index) / total;
            let weight = (p_sample * len as f64).powf(-beta) / max_weight;
            let transition = self.buffer.get(index).ok_or(StoreError::IndexOutOfRange {
                index,
                len,
            })?;
            batch.push(transition, weight);
        }
        batch.indices = Some(indices);
        Ok(batch)
    }

    fn update_priorities(
        &mut self,
        indices: &[usize],
        priorities: &[f64],
    ) -> Result<(), StoreError> {
        if indices.len() != priorities.len() {
            return Err(StoreError::LengthMismatch {
                indices: indices.len(),
                priorities: priorities.len(),
            });
        }
        let len = self.buffer.len();
        for (&index, &priority) in indices.iter().zip(priorities) {
            if !(priority > 0.0 && priority.is_finite()) {
                return Err(StoreError::InvalidPriority(priority));
            }
            if index >= len {
                return Err(StoreError::IndexOutOfRange { index, len });
            }
        }
        for (&index, &priority) in indices.iter().zip(priorities) {
            self.set_priority(index, priority);
            self.max_priority = self.max_priority.max(priority);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }
}
