//! Execution queue for a single pass.

use std::collections::VecDeque;
use std::fmt;

/// How an operation is driven during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Regular content loading.
    Main,
    /// Appending content for a page (the first page is 1).
    Pagination { page_index: usize },
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Pagination { page_index } => write!(f, "page {page_index}"),
        }
    }
}

/// A pending invocation of the operation at `operation_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionEntry {
    pub operation_index: usize,
    pub mode: ExecutionMode,
}

impl ExecutionEntry {
    pub fn main(operation_index: usize) -> Self {
        Self {
            operation_index,
            mode: ExecutionMode::Main,
        }
    }

    pub fn pagination(operation_index: usize, page_index: usize) -> Self {
        Self {
            operation_index,
            mode: ExecutionMode::Pagination { page_index },
        }
    }
}

/// Entries pending execution, kept in ascending operation index order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQueue {
    entries: VecDeque<ExecutionEntry>,
}

impl ExecutionQueue {
    /// Main entries for every position in `range`.
    pub fn main(range: std::ops::Range<usize>) -> Self {
        Self {
            entries: range.map(ExecutionEntry::main).collect(),
        }
    }

    /// Pagination entries for `page_index` at the given positions.
    pub fn pagination(page_index: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut queue = Self::default();
        for index in indices {
            queue.insert_sorted(ExecutionEntry::pagination(index, page_index));
        }
        queue
    }

    pub fn pop_front(&mut self) -> Option<ExecutionEntry> {
        self.entries.pop_front()
    }

    /// Insert an entry at its ordered position.
    ///
    /// Returns `false` when an entry for the same position and mode is
    /// already queued.
    pub fn insert_sorted(&mut self, entry: ExecutionEntry) -> bool {
        if self.contains(&entry) {
            return false;
        }
        let position = self
            .entries
            .iter()
            .position(|e| e.operation_index > entry.operation_index)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        true
    }

    pub fn contains(&self, entry: &ExecutionEntry) -> bool {
        self.entries.contains(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Operation indices in queue order.
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.operation_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_queue_covers_range_in_order() {
        let mut queue = ExecutionQueue::main(0..3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front(), Some(ExecutionEntry::main(0)));
        assert_eq!(queue.indices(), vec![1, 2]);
    }

    #[test]
    fn insert_sorted_keeps_ascending_order() {
        let mut queue = ExecutionQueue::main(0..4);
        queue.pop_front();
        queue.pop_front();
        assert!(queue.insert_sorted(ExecutionEntry::main(1)));
        assert_eq!(queue.indices(), vec![1, 2, 3]);
    }

    #[test]
    fn insert_sorted_rejects_duplicates() {
        let mut queue = ExecutionQueue::main(0..2);
        assert!(!queue.insert_sorted(ExecutionEntry::main(1)));
        assert_eq!(queue.len(), 2);
        // Same position, different mode, is a distinct entry.
        assert!(queue.insert_sorted(ExecutionEntry::pagination(1, 1)));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn pagination_queue_from_indices() {
        let mut queue = ExecutionQueue::pagination(2, [3, 1]);
        assert_eq!(queue.pop_front(), Some(ExecutionEntry::pagination(1, 2)));
        assert_eq!(queue.pop_front(), Some(ExecutionEntry::pagination(3, 2)));
        assert!(queue.is_empty());
        assert_eq!(ExecutionMode::Pagination { page_index: 2 }.to_string(), "page 2");
    }
}
