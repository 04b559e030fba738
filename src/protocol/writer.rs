//! Frame serialization onto a transport.

use std::io::Write;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pool::{BufferPool, PooledBuf};
use crate::protocol::OpCode;
use crate::protocol::header::{MAX_HEADER_SIZE, encode_header};
use crate::protocol::mask::apply_mask;

/// Writes whole frames to a transport, one `write_all` per frame.
pub struct FrameWriter<W: Write> {
    inner: W,
    pool: Arc<dyn BufferPool>,
    closed: bool,
}

impl<W: Write> FrameWriter<W> {
    /// Create a writer drawing scratch buffers from `pool`.
    pub fn new(inner: W, pool: Arc<dyn BufferPool>) -> Self {
        Self {
            inner,
            pool,
            closed: false,
        }
    }

    /// Encode and send one frame.
    ///
    /// The payload is masked with `mask_key` when one is given; `payload`
    /// itself is left untouched.
    ///
    /// # Errors
    ///
    /// - `Error::WriteClosed` after [`close`](Self::close)
    /// - `Error::Io` if the transport fails
    pub fn write_frame(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
        fin: bool,
        rsv1: bool,
        mask_key: Option<u32>,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::WriteClosed);
        }

        let mut scratch = PooledBuf::acquire(&self.pool, payload.len() + MAX_HEADER_SIZE);
        let header_len = encode_header(
            &mut scratch,
            fin,
            rsv1,
            false,
            false,
            opcode,
            payload.len() as u64,
            mask_key.is_some(),
            mask_key.unwrap_or(0),
        );

        let end = header_len + payload.len();
        scratch[header_len..end].copy_from_slice(payload);
        if let Some(key) = mask_key {
            apply_mask(&mut scratch[header_len..end], key);
        }

        self.inner.write_all(&scratch[..end])?;
        Ok(())
    }

    /// Flush the transport.
    ///
    /// # Errors
    ///
    /// - `Error::WriteClosed` after [`close`](Self::close)
    /// - `Error::Io` if the transport fails
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::WriteClosed);
        }
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and refuse every later write.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the final flush fails; the writer is closed
    /// regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.flush()?;
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shared reference to the transport.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutable reference to the transport.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Recover the transport.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + std::fmt::Debug> std::fmt::Debug for FrameWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("inner", &self.inner)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Append one encoded frame to `out`.
pub fn write_frame_to_vec(
    out: &mut Vec<u8>,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    rsv1: bool,
    mask_key: Option<u32>,
) {
    let mut head = [0u8; MAX_HEADER_SIZE];
    let header_len = encode_header(
        &mut head,
        fin,
        rsv1,
        false,
        false,
        opcode,
        payload.len() as u64,
        mask_key.is_some(),
        mask_key.unwrap_or(0),
    );

    out.reserve(header_len + payload.len());
    out.extend_from_slice(&head[..header_len]);
    let start = out.len();
    out.extend_from_slice(payload);
    if let Some(key) = mask_key {
        apply_mask(&mut out[start..], key);
    }
}
