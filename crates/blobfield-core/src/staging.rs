//! Producer/consumer staging buffers.

use std::mem;

use parking_lot::Mutex;

/// A lock-protected buffer filled by any thread and drained in bulk once per
/// tick. The lock is held for a push or a swap, never for per-item work.
#[derive(Debug)]
pub struct StagingBuffer<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for StagingBuffer<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> StagingBuffer<T> {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one item.
    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Take everything staged so far, leaving the buffer empty.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        mem::take(&mut *self.items.lock())
    }

    /// Number of staged items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_empties() {
        let buffer = StagingBuffer::new();
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.drain(), vec![1, 2]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let buffer = Arc::new(StagingBuffer::new());
        let producers: Vec<_> = (0..4)
            .map(|worker| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..250 {
                        buffer.push(worker * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut drained = buffer.drain();
        drained.sort_unstable();
        drained.dedup();
        assert_eq!(drained.len(), 1000);
    }
}
