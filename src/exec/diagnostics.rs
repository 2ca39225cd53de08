// src/exec/diagnostics.rs

//! Bounded FIFO of the most recent raw stdout lines, dumped when a job
//! fails.

use std::collections::VecDeque;

/// Number of lines kept for post-mortem logging.
pub const DIAGNOSTIC_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct DiagnosticRingBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for DiagnosticRingBuffer {
    fn default() -> Self {
        Self::with_capacity(DIAGNOSTIC_CAPACITY)
    }
}

impl DiagnosticRingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Take all lines, oldest first, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
