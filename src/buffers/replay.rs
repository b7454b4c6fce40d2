use super::{ExperienceStore, SampledBatch, StoreError, Transition};
use crate::Prng;
use rand::Rng;

/// Uniform experience replay over a circular buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayBuffer {
    /// Stored transitions. Does not grow beyond `capacity`.
    storage: Vec<Transition>,
    capacity: usize,
    /// Index at which the next transition is written.
    next_index: usize,
}

impl ReplayBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: Vec::with_capacity(capacity),
            capacity,
            next_index: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write a transition and return the index it was stored at.
    pub(super) fn insert(&mut self, transition: Transition) -> usize {
        let index = self.next_index;
        if index >= self.storage.len() {
            self.storage.push(transition);
        } else {
            self.storage[index] = transition;
        }
        self.next_index = (index + 1) % self.capacity;
        index
    }

    pub(super) fn get(&self, index: usize) -> Option<&Transition> {
        self.storage.get(index)
    }
}

impl ExperienceStore for ReplayBuffer {
    fn add(&mut self, transition: Transition) {
        self.insert(transition);
    }

    fn sample(
        &self,
        batch_size: usize,
        _beta: Option<f64>,
        rng: &mut Prng,
    ) -> Result<SampledBatch, StoreError> {
        if self.storage.is_empty() {
            return Err(StoreError::Empty);
        }
        let mut batch = SampledBatch::with_capacity(batch_size);
        for _ in 0..batch_size {
            let index = rng.gen_range(0..self.storage.len());
            batch.push(&self.storage[index], 1.0);
        }
        Ok(batch)
    }

    fn update_priorities(
        &mut self,
        _indices: &[usize],
        _priorities: &[f64],
    ) -> Result<(), StoreError> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.storage.len()
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;

    pub fn transition(action: usize) -> Transition {
        Transition {
            state: Array2::zeros((2, 2)),
            action,
            reward: action as f64,
            next_state: Array2::ones((2, 2)),
            done: false,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.add(transition(i));
        }
        assert_eq!(buffer.len(), 3);
        let actions: Vec<_> = (0..3).map(|i| buffer.get(i).unwrap().action).collect();
        assert_eq!(actions, [3, 4, 2]);
    }

    #[test]
    fn sample_empty_fails() {
        let buffer = ReplayBuffer::new(3);
        let mut rng = Prng::seed_from_u64(0);
        assert_eq!(buffer.sample(2, None, &mut rng), Err(StoreError::Empty));
    }

    #[test]
    fn sample_has_unit_weights_and_no_indices() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..4 {
            buffer.add(transition(i));
        }
        let mut rng = Prng::seed_from_u64(1);
        let batch = buffer.sample(8, Some(0.4), &mut rng).unwrap();
        assert_eq!(batch.len(), 8);
        assert!(batch.weights.iter().all(|&w| w == 1.0));
        assert!(batch.indices.is_none());
        assert!(batch.actions.iter().all(|&a| a < 4));
        for (action, reward) in batch.actions.iter().zip(&batch.rewards) {
            assert_eq!(*action as f64, *reward);
        }
    }

    #[test]
    fn update_priorities_is_noop() {
        let mut buffer = ReplayBuffer::new(2);
        assert!(buffer.update_priorities(&[5], &[-1.0]).is_ok());
    }
}
