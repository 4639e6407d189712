use std::collections::VecDeque;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("pending queue is empty")]
    Empty,
}

/// FIFO of items waiting for a concurrency slot.
#[derive(Debug)]
pub struct PendingQueue<T> {
    inner: VecDeque<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }
}

impl<T> PendingQueue<T> {
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        self.inner.pop_front().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Empties the queue, returning what was still waiting.
    pub fn drain(&mut self) -> Vec<T> {
        self.inner.drain(..).collect()
    }
}

impl<T> FromIterator<T> for PendingQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
