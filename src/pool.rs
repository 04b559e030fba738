//! Size-classed byte buffer pool.
//!
//! Frame readers and writers borrow scratch and window buffers through the
//! [`BufferPool`] trait. [`SizeClassPool`] keeps free lists for 64 size classes
//! of `k * 1024 + 14` bytes, so a buffer always has room for one maximal frame
//! header on top of a whole number of pages.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::header::MAX_HEADER_SIZE;

/// Granularity of the size classes.
pub const PAGE_SIZE: usize = 1024;

/// Number of size classes.
pub const CLASS_COUNT: usize = 64;

/// Default number of free buffers retained per class.
pub const DEFAULT_CLASS_DEPTH: usize = 32;

/// Source of reusable byte buffers.
///
/// Implementations must be safe to share across threads.
pub trait BufferPool: Send + Sync {
    /// Return a buffer whose length is at least `min_size`.
    ///
    /// Contents are unspecified.
    fn acquire(&self, min_size: usize) -> Vec<u8>;

    /// Hand a buffer back to the pool.
    fn release(&self, buf: Vec<u8>);
}

/// Byte size of size class `k` (1-based).
#[inline]
const fn class_size(k: usize) -> usize {
    k * PAGE_SIZE + MAX_HEADER_SIZE
}

/// Pool with 64 mutex-protected free lists of bounded depth.
///
/// Requests above the largest class are served by a fresh allocation of
/// `min_size + 14` bytes that is dropped on release.
pub struct SizeClassPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    depth: usize,
}

impl SizeClassPool {
    /// Create a pool retaining up to [`DEFAULT_CLASS_DEPTH`] buffers per class.
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_CLASS_DEPTH)
    }

    /// Create a pool retaining up to `depth` buffers per class.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        let classes = (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect();
        Self { classes, depth }
    }

    /// Create a pool already wrapped for sharing.
    #[must_use]
    pub fn shared() -> Arc<dyn BufferPool> {
        Arc::new(Self::new())
    }

    /// Index of the smallest class holding `min_size` bytes.
    fn class_for_request(min_size: usize) -> Option<usize> {
        let pages = min_size.saturating_sub(MAX_HEADER_SIZE).div_ceil(PAGE_SIZE).max(1);
        (pages <= CLASS_COUNT).then(|| pages - 1)
    }

    /// Index of the largest class that fits inside `capacity`.
    fn class_for_capacity(capacity: usize) -> Option<usize> {
        if capacity < class_size(1) {
            return None;
        }
        let pages = ((capacity - MAX_HEADER_SIZE) / PAGE_SIZE).min(CLASS_COUNT);
        Some(pages - 1)
    }

    /// Total number of free buffers held across all classes.
    #[must_use]
    pub fn available(&self) -> usize {
        self.classes
            .iter()
            .map(|class| class.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

impl Default for SizeClassPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SizeClassPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeClassPool")
            .field("depth", &self.depth)
            .field("available", &self.available())
            .finish()
    }
}

impl BufferPool for SizeClassPool {
    fn acquire(&self, min_size: usize) -> Vec<u8> {
        let Some(idx) = Self::class_for_request(min_size) else {
            return vec![0u8; min_size + MAX_HEADER_SIZE];
        };

        let size = class_size(idx + 1);
        let recycled = self.classes[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match recycled {
            Some(mut buf) => {
                buf.resize(size, 0);
                buf
            }
            None => vec![0u8; size],
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > class_size(CLASS_COUNT) {
            return;
        }
        let Some(idx) = Self::class_for_capacity(buf.capacity()) else {
            return;
        };

        buf.clear();
        let mut free = self.classes[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.depth {
            free.push(buf);
        }
    }
}

/// Buffer on loan from a [`BufferPool`].
///
/// The buffer goes back to its pool exactly once, when the guard drops.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<dyn BufferPool>,
}

impl PooledBuf {
    /// Acquire a buffer of at least `min_size` bytes from `pool`.
    #[must_use]
    pub fn acquire(pool: &Arc<dyn BufferPool>, min_size: usize) -> Self {
        Self {
            buf: pool.acquire(min_size),
            pool: Arc::clone(pool),
        }
    }

    /// The pool this buffer returns to.
    #[must_use]
    pub fn pool(&self) -> &Arc<dyn BufferPool> {
        &self.pool
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf").field("len", &self.buf.len()).finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
