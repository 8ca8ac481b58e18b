use rand::Rng;
use rand::seq::index;

use crate::error::{ConfigError, DqnError, Result};
use crate::experience::Transition;

/// Fixed-capacity ring buffer of transitions. Once full, each push overwrites
/// the slot under the write cursor, which always holds the oldest entry.
pub struct ReplayMemory {
    slots: Vec<Transition>,
    capacity: usize,
    cursor: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> std::result::Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Validation(
                "replay memory capacity must be > 0".into(),
            ));
        }
        Ok(ReplayMemory {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        })
    }

    pub fn push(&mut self, transition: Transition) {
        if self.slots.len() < self.capacity {
            self.slots.push(transition);
        } else {
            self.slots[self.cursor] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draws `k` distinct transitions uniformly at random. The returned
    /// transitions are clones, so the caller can keep them while the memory
    /// keeps changing.
    pub fn sample<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<Transition>> {
        if k > self.slots.len() {
            return Err(DqnError::InsufficientSamples {
                requested: k,
                available: self.slots.len(),
            });
        }
        let indices = index::sample(rng, self.slots.len(), k);
        Ok(indices.iter().map(|i| self.slots[i].clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.slots.len() < self.capacity { 0 } else { self.cursor };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }
}
