use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::grid::{Grid, Score};

pub const DEFAULT_MAX_UNDO_DEPTH: usize = 100;

/// Snapshot is the part of a game that undo restores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub grid: Grid,
    pub current_score: Score,
    pub best_score: Score,
}

/// UndoStack keeps the most recent snapshots, dropping the oldest once `capacity` is exceeded.
#[derive(Clone, Debug)]
pub struct UndoStack {
    entries: VecDeque<Snapshot>,
    capacity: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_DEPTH)
    }
}

impl UndoStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_UNDO_DEPTH) + 1),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            let _ = self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot(score: Score) -> Snapshot {
        Snapshot {
            grid: Grid::empty(),
            current_score: score,
            best_score: score,
        }
    }

    #[test]
    fn pop_is_last_in_first_out() {
        let mut stack = UndoStack::new(3);
        stack.push(snapshot(1));
        stack.push(snapshot(2));
        assert_eq!(stack.pop().map(|s| s.current_score), Some(2));
        assert_eq!(stack.pop().map(|s| s.current_score), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut stack = UndoStack::default();
        for score in 0..=(DEFAULT_MAX_UNDO_DEPTH as Score) {
            stack.push(snapshot(score));
        }
        assert_eq!(stack.len(), DEFAULT_MAX_UNDO_DEPTH);
        assert_eq!(stack.capacity(), DEFAULT_MAX_UNDO_DEPTH);
        assert_eq!(stack.iter().next().map(|s| s.current_score), Some(1));

        let mut popped = Vec::new();
        while let Some(s) = stack.pop() {
            popped.push(s.current_score);
        }
        assert!(!popped.contains(&0));
        assert_eq!(popped.last(), Some(&1));
    }

    #[test]
    fn clear() {
        let mut stack = UndoStack::new(2);
        stack.push(snapshot(1));
        stack.clear();
        assert!(stack.is_empty());
    }
}
