use std::collections::VecDeque;

use crate::directory::Row;

/// Upserts waiting for their preconditions, in arrival order
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<(String, Row)>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, key: String, row: Row) {
        self.entries.push_back((key, row));
    }

    /// Drain every queued entry, oldest first
    pub fn take(&mut self) -> Vec<(String, Row)> {
        self.entries.drain(..).collect()
    }

    /// Put `older` entries back ahead of anything queued since they were taken
    pub fn prepend(&mut self, mut older: RetryQueue) {
        older.entries.append(&mut self.entries);
        self.entries = older.entries;
    }
}
