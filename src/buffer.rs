//! Sliding-window receive buffer.
//!
//! A [`WindowBuffer`] owns one pooled buffer and two cursors `r <= w <= len`.
//! Bytes in `[r, w)` have been read from the transport but not yet consumed;
//! `[w, len)` is free tail space for the next read. Consumed space in front of
//! `r` is reclaimed by [`WindowBuffer::compact`], and a buffer that is too
//! small even after compaction is swapped for a larger one from the pool.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::pool::{BufferPool, PooledBuf};

/// Fixed-size byte window over a pooled buffer.
#[derive(Debug)]
pub struct WindowBuffer {
    buf: PooledBuf,
    r: usize,
    w: usize,
    reallocations: usize,
}

impl WindowBuffer {
    /// Create a window over a buffer of at least `size` bytes from `pool`.
    #[must_use]
    pub fn new(pool: &Arc<dyn BufferPool>, size: usize) -> Self {
        Self::from_buf(PooledBuf::acquire(pool, size))
    }

    /// Create an empty window over an already acquired buffer.
    #[must_use]
    pub fn from_buf(buf: PooledBuf) -> Self {
        Self {
            buf,
            r: 0,
            w: 0,
            reallocations: 0,
        }
    }

    /// Total size of the backing buffer.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Read cursor.
    #[inline]
    #[must_use]
    pub fn read_pos(&self) -> usize {
        self.r
    }

    /// Write cursor.
    #[inline]
    #[must_use]
    pub fn write_pos(&self) -> usize {
        self.w
    }

    /// Number of buffered but unconsumed bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.w - self.r
    }

    /// Contiguous free space after the write cursor.
    #[inline]
    #[must_use]
    pub fn write_capacity(&self) -> usize {
        self.buf.len() - self.w
    }

    /// Free space including the consumed prefix that compaction would reclaim.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.buf.len() - self.w + self.r
    }

    /// Number of times the backing buffer has been replaced.
    #[inline]
    #[must_use]
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// Unconsumed bytes.
    #[inline]
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.r..self.w]
    }

    /// Consume `n` bytes and return them.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered.
    pub fn take(&mut self, n: usize) -> &mut [u8] {
        assert!(n <= self.buffered(), "take({}) with {} bytes buffered", n, self.buffered());
        let start = self.r;
        self.r += n;
        &mut self.buf[start..start + n]
    }

    /// Discard `n` buffered bytes.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered.
    pub fn consume(&mut self, n: usize) {
        let _ = self.take(n);
    }

    /// Perform one read from `transport` into the free tail.
    ///
    /// Returns the number of bytes read, which is never zero.
    ///
    /// # Errors
    ///
    /// - `Error::UnexpectedEof` if the transport reports end of stream
    /// - `Error::Io` for other transport failures
    ///
    /// # Panics
    ///
    /// Panics if the tail is full.
    pub fn fill_from<R: Read + ?Sized>(&mut self, transport: &mut R) -> Result<usize> {
        assert!(self.w < self.buf.len(), "fill_from on a full window");
        loop {
            match transport.read(&mut self.buf[self.w..]) {
                Ok(0) => return Err(Error::UnexpectedEof),
                Ok(n) => {
                    self.w += n;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read exactly `n` bytes into `[w, w + n)`.
    ///
    /// # Errors
    ///
    /// Same as [`fill_from`](Self::fill_from). On error the window is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`write_capacity`](Self::write_capacity).
    pub fn read_exact_into_tail<R: Read + ?Sized>(
        &mut self,
        transport: &mut R,
        n: usize,
    ) -> Result<()> {
        assert!(
            n <= self.write_capacity(),
            "tail read of {} bytes with {} bytes free",
            n,
            self.write_capacity()
        );
        transport.read_exact(&mut self.buf[self.w..self.w + n])?;
        self.w += n;
        Ok(())
    }

    /// Move unconsumed bytes to the front of the buffer.
    pub fn compact(&mut self) {
        if self.r == 0 {
            return;
        }
        trace!("compacting window: moving {} bytes from {}", self.buffered(), self.r);
        self.buf.copy_within(self.r..self.w, 0);
        self.w -= self.r;
        self.r = 0;
    }

    /// Make the window at least `needed_total` bytes long.
    ///
    /// When the current buffer is smaller, a buffer of
    /// `needed_total * growth_factor` bytes is acquired from the same pool and
    /// the unconsumed bytes move to its front. Returns whether a new buffer
    /// was installed.
    pub fn ensure_capacity(&mut self, needed_total: usize, growth_factor: f32) -> bool {
        if needed_total <= self.buf.len() {
            return false;
        }

        let factor = if growth_factor.is_finite() && growth_factor > 1.0 {
            growth_factor
        } else {
            1.0
        };
        let size = ((needed_total as f64) * f64::from(factor)) as usize;
        let size = size.max(needed_total);

        debug!(
            "growing receive window from {} to {} bytes ({} buffered)",
            self.buf.len(),
            size,
            self.buffered()
        );
        let new_buf = PooledBuf::acquire(self.buf.pool(), size);
        self.reset(new_buf);
        self.reallocations += 1;
        true
    }

    /// Rebind the window to `new_buf`, keeping the unconsumed bytes.
    ///
    /// The previous buffer returns to its pool.
    ///
    /// # Panics
    ///
    /// Panics if `new_buf` cannot hold the unconsumed bytes.
    pub fn reset(&mut self, mut new_buf: PooledBuf) {
        let unread = self.buffered();
        assert!(
            new_buf.len() >= unread,
            "new buffer of {} bytes cannot hold {} unread bytes",
            new_buf.len(),
            unread
        );
        new_buf[..unread].copy_from_slice(&self.buf[self.r..self.w]);
        self.buf = new_buf;
        self.r = 0;
        self.w = unread;
    }
}
