//! Bounded history ring shared between controller tiers

use std::collections::VecDeque;

/// Fixed-capacity ring; pushing past capacity evicts the oldest entry
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryRing<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Up to `n` most recent entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Everything retained, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut ring = HistoryRing::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.snapshot(), vec![2, 3, 4]);
        assert_eq!(ring.latest(), Some(&4));
    }

    #[test]
    fn test_recent_window() {
        let mut ring = HistoryRing::new(10);
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.recent(2), vec![2, 3]);
        assert_eq!(ring.recent(100).len(), 4);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut ring = HistoryRing::new(0);
        ring.push('a');
        ring.push('b');
        assert_eq!(ring.snapshot(), vec!['b']);
    }
}
