//! Failure injection for the mock engine
//!
//! Tests queue one-shot failures per operation; the mock consumes them in
//! FIFO order before executing the real handler.

use std::collections::{HashMap, VecDeque};

use crate::engine::Operation;

/// Queued one-shot failure messages per operation
#[derive(Debug, Default)]
pub struct FailureInjector {
    queued: HashMap<Operation, VecDeque<String>>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next occurrence of the operation.
    pub fn inject(&mut self, op: Operation, message: impl Into<String>) {
        self.queued.entry(op).or_default().push_back(message.into());
    }

    /// Consume the next queued failure for the operation, if any.
    pub fn take(&mut self, op: Operation) -> Option<String> {
        self.queued.get_mut(&op).and_then(VecDeque::pop_front)
    }

    /// Drop all queued failures.
    pub fn clear(&mut self) {
        self.queued.clear();
    }
}
