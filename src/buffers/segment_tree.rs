//! Segment trees over a fixed power-of-two number of leaves.

/// Binary segment tree reducing leaves with an associative operation.
#[derive(Debug, Clone, PartialEq)]
struct SegmentTree {
    /// Nodes in heap order; `nodes[1]` is the root and leaves start at `capacity`.
    nodes: Vec<f64>,
    capacity: usize,
    neutral: f64,
    op: fn(f64, f64) -> f64,
}

impl SegmentTree {
    fn new(capacity: usize, neutral: f64, op: fn(f64, f64) -> f64) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            nodes: vec![neutral; 2 * capacity],
            capacity,
            neutral,
            op,
        }
    }

    fn set(&mut self, index: usize, value: f64) {
        assert!(index < self.capacity, "leaf index out of range");
        let mut node = index + self.capacity;
        self.nodes[node] = value;
        while node > 1 {
            node /= 2;
            self.nodes[node] = (self.op)(self.nodes[2 * node], self.nodes[2 * node + 1]);
        }
    }

    fn get(&self, index: usize) -> f64 {
        self.nodes[index + self.capacity]
    }

    /// Reduction over the leaves in `start..end`.
    fn reduce(&self, start: usize, end: usize) -> f64 {
        let mut result = self.neutral;
        let mut lo = start + self.capacity;
        let mut hi = end.min(self.capacity) + self.capacity;
        while lo < hi {
            if lo % 2 == 1 {
                result = (self.op)(result, self.nodes[lo]);
                lo += 1;
            }
            if hi % 2 == 1 {
                hi -= 1;
                result = (self.op)(result, self.nodes[hi]);
            }
            lo /= 2;
            hi /= 2;
        }
        result
    }

    fn root(&self) -> f64 {
        self.nodes[1]
    }
}

/// Segment tree of leaf sums with prefix-sum search.
#[derive(Debug, Clone, PartialEq)]
pub struct SumTree(SegmentTree);

impl SumTree {
    /// Tree with at least `capacity` zero leaves.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self(SegmentTree::new(capacity, 0.0, |a, b| a + b))
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.0.set(index, value);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> f64 {
        self.0.get(index)
    }

    /// Sum of all leaves.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.root()
    }

    /// Sum of the leaves in `start..end`.
    #[must_use]
    pub fn sum(&self, start: usize, end: usize) -> f64 {
        self.0.reduce(start, end)
    }

    /// Smallest index `i` such that `sum(0, i + 1) > prefix_sum`.
    ///
    /// `prefix_sum` should be in `[0, total())`; larger values give the last non-empty leaf
    /// reached by the descent.
    #[must_use]
    pub fn find_prefix_sum_index(&self, mut prefix_sum: f64) -> usize {
        let nodes = &self.0.nodes;
        let mut node = 1;
        while node < self.0.capacity {
            let left = 2 * node;
            if nodes[left] > prefix_sum {
                node = left;
            } else {
                prefix_sum -= nodes[left];
                node = left + 1;
            }
        }
        node - self.0.capacity
    }
}

/// Segment tree of leaf minima.
#[derive(Debug, Clone, PartialEq)]
pub struct MinTree(SegmentTree);

impl MinTree {
    /// Tree with at least `capacity` infinite leaves.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self(SegmentTree::new(capacity, f64::INFINITY, f64::min))
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.0.set(index, value);
    }

    /// Minimum of all leaves.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.0.root()
    }

    /// Minimum of the leaves in `start..end`.
    #[must_use]
    pub fn min_in(&self, start: usize, end: usize) -> f64 {
        self.0.reduce(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sum_tree() -> SumTree {
        let mut tree = SumTree::new(5);
        for (i, v) in [1.0, 2.0, 0.0, 3.0, 4.0].into_iter().enumerate() {
            tree.set(i, v);
        }
        tree
    }

    #[test]
    fn capacity_rounds_up() {
        let tree = SumTree::new(5);
        assert_eq!(tree.0.capacity, 8);
    }

    #[test]
    fn sum_total_and_ranges() {
        let tree = sum_tree();
        assert_eq!(tree.total(), 10.0);
        assert_eq!(tree.sum(1, 4), 5.0);
        assert_eq!(tree.sum(0, 0), 0.0);
        assert_eq!(tree.sum(3, 100), 7.0);
    }

    #[test]
    fn overwrite_updates_parents() {
        let mut tree = sum_tree();
        tree.set(0, 5.0);
        assert_eq!(tree.get(0), 5.0);
        assert_eq!(tree.total(), 14.0);
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.99, 0)]
    #[case(1.0, 1)]
    #[case(2.5, 1)]
    #[case(3.0, 3)]
    #[case(5.99, 3)]
    #[case(6.0, 4)]
    #[case(9.99, 4)]
    fn prefix_sum_search(#[case] prefix: f64, #[case] expected: usize) {
        assert_eq!(sum_tree().find_prefix_sum_index(prefix), expected);
    }

    #[test]
    fn min_queries() {
        let mut tree = MinTree::new(4);
        assert_eq!(tree.min(), f64::INFINITY);
        tree.set(0, 3.0);
        tree.set(1, 1.0);
        tree.set(2, 2.0);
        assert_eq!(tree.min(), 1.0);
        assert_eq!(tree.min_in(2, 4), 2.0);
        tree.set(1, 5.0);
        assert_eq!(tree.min(), 2.0);
    }
}
