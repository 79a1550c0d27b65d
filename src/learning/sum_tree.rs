//! Binary sum tree over leaf priorities
//!
//! Leaves sit at `capacity - 1 ..` of a flat array; each internal node holds
//! the sum of its children. The leaf count is rounded up to a power of two so
//! leaves appear in index order. Update and prefix-sum lookup are O(log N).

#[derive(Debug, Clone)]
pub struct SumTree {
    capacity: usize,
    nodes: Vec<f64>,
}

impl SumTree {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            capacity,
            nodes: vec![0.0; 2 * capacity - 1],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total(&self) -> f64 {
        self.nodes[0]
    }

    pub fn get(&self, leaf: usize) -> f64 {
        self.nodes[leaf + self.capacity - 1]
    }

    pub fn set(&mut self, leaf: usize, value: f64) {
        let mut idx = leaf + self.capacity - 1;
        let delta = value - self.nodes[idx];
        self.nodes[idx] = value;
        while idx > 0 {
            idx = (idx - 1) / 2;
            self.nodes[idx] += delta;
        }
    }

    /// Leaf whose cumulative range contains `mass` (clamped into `[0, total)`)
    pub fn find(&self, mass: f64) -> usize {
        let mut mass = mass.clamp(0.0, self.total());
        let mut idx = 0;
        loop {
            let left = 2 * idx + 1;
            if left >= self.nodes.len() {
                break;
            }
            let right = left + 1;
            if mass < self.nodes[left] || self.nodes[right] <= 0.0 {
                idx = left;
            } else {
                mass -= self.nodes[left];
                idx = right;
            }
        }
        idx + 1 - self.capacity
    }

    /// Recompute every internal node from the leaves
    ///
    /// Removes accumulated floating-point drift from incremental updates.
    pub fn rebuild(&mut self) {
        for idx in (0..self.capacity - 1).rev() {
            self.nodes[idx] = self.nodes[2 * idx + 1] + self.nodes[2 * idx + 2];
        }
    }
}
