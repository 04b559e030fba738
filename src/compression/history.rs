//! Fixed-capacity history window for context takeover.

use std::collections::VecDeque;

/// The most recent `2^bit` bytes that passed through one compression
/// direction.
///
/// Writing past capacity evicts the oldest bytes first.
#[derive(Debug, Clone)]
pub struct HistoryDict {
    data: VecDeque<u8>,
    capacity: usize,
}

impl HistoryDict {
    /// Create an empty dictionary holding up to `2^bit` bytes.
    #[must_use]
    pub fn new(bit: u8) -> Self {
        Self::with_capacity(1usize << bit)
    }

    /// Create an empty dictionary holding up to `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `bytes`, keeping only the newest `capacity` bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        if bytes.len() >= self.capacity {
            self.data.clear();
            self.data.extend(&bytes[bytes.len() - self.capacity..]);
            return;
        }

        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.capacity);
        self.data.drain(..overflow);
        self.data.extend(bytes);
    }

    /// Current contents, oldest byte first.
    pub fn as_slice(&mut self) -> &[u8] {
        self.data.make_contiguous()
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of bytes held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
