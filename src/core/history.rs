//! Operation history: bounded FIFO of recent touch operations
//!
//! - Capacity 20, oldest evicted first
//! - Insertion order is temporal order

use std::collections::VecDeque;

use crate::types::TouchOperation;
use crate::HISTORY_CAPACITY;

/// Bounded ring of recent operations, one per session
#[derive(Debug, Clone)]
pub struct OperationHistory {
    operations: VecDeque<TouchOperation>,
    capacity: usize,
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHistory {
    /// Create history with default capacity (20)
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create history with custom capacity (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            operations: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Add an operation, evicting the oldest on overflow
    pub fn append(&mut self, operation: TouchOperation) {
        self.operations.push_back(operation);
        while self.operations.len() > self.capacity {
            self.operations.pop_front();
        }
    }

    /// Owned copy of the contents, oldest first
    pub fn snapshot(&self) -> Vec<TouchOperation> {
        self.operations.iter().cloned().collect()
    }

    /// Last `n` operations (or fewer), oldest first
    pub fn recent_window(&self, n: usize) -> Vec<TouchOperation> {
        let skip = self.operations.len().saturating_sub(n);
        self.operations.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(i: i64) -> TouchOperation {
        TouchOperation::tap(i as f64, 0.0, i)
    }

    #[test]
    fn test_append_below_capacity() {
        let mut history = OperationHistory::new();
        assert!(history.is_empty());

        history.append(tap(1));
        history.append(tap(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshot()[1].timestamp, 2);
    }

    #[test]
    fn test_bound_holds_for_any_length() {
        for n in 0..50i64 {
            let mut history = OperationHistory::new();
            for i in 0..n {
                history.append(tap(i));
            }
            let snap = history.snapshot();
            let expected = (n as usize).min(HISTORY_CAPACITY);
            assert_eq!(snap.len(), expected);

            // Contents are exactly the last `expected` appends, in order
            let first = n - expected as i64;
            let stamps: Vec<i64> = snap.iter().map(|op| op.timestamp).collect();
            assert_eq!(stamps, (first..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_snapshot_does_not_alias() {
        let mut history = OperationHistory::new();
        history.append(tap(1));
        let snap = history.snapshot();
        history.append(tap(2));

        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].timestamp, 1);
    }

    #[test]
    fn test_recent_window() {
        let mut history = OperationHistory::new();
        assert!(history.recent_window(5).is_empty());

        for i in 0..3 {
            history.append(tap(i));
        }
        assert_eq!(history.recent_window(5).len(), 3);

        for i in 3..8 {
            history.append(tap(i));
        }
        let window: Vec<i64> = history.recent_window(5).iter().map(|op| op.timestamp).collect();
        assert_eq!(window, vec![3, 4, 5, 6, 7]);
        assert!(history.recent_window(0).is_empty());
    }

    #[test]
    fn test_custom_capacity() {
        let mut history = OperationHistory::with_capacity(0);
        history.append(tap(1));
        history.append(tap(2));
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshot()[0].timestamp, 2);
    }
}
