//! Blocking frame reader over a sliding receive window.

use std::io::Read;
use std::sync::Arc;

use log::trace;

use crate::buffer::WindowBuffer;
use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::pool::BufferPool;
use crate::protocol::frame::Frame;
use crate::protocol::header::{
    FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_HEADER_SIZE, decode_header, header_len,
};
use crate::protocol::mask::apply_mask;

/// Reads frames from a transport into a pooled window.
///
/// Each returned [`Frame`] borrows its payload from the window, so the next
/// frame can only be read once the previous one is dropped.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    window: WindowBuffer,
    limits: Limits,
    growth_factor: f32,
}

impl<R: Read> FrameReader<R> {
    /// Create a reader with a window of `config.read_buffer_size` bytes.
    pub fn new(inner: R, pool: Arc<dyn BufferPool>, config: &Config) -> Self {
        let size = config.read_buffer_size.max(MAX_HEADER_SIZE);
        Self {
            inner,
            window: WindowBuffer::new(&pool, size),
            limits: config.limits.clone(),
            growth_factor: config.effective_growth_factor(),
        }
    }

    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// - `Error::UnexpectedEof` if the transport ends mid-frame
    /// - `Error::TooLargePayload` if the declared length exceeds a non-zero
    ///   `max_payload_size`
    /// - `Error::PayloadTooLargeForPlatform` if the length does not fit
    /// - `Error::Io` for other transport failures
    pub fn read_frame(&mut self) -> Result<Frame<'_>> {
        self.read_frame_within(None)
    }

    /// Read the next frame of a message that already holds `assembled`
    /// bytes.
    ///
    /// The declared length is checked before any payload is buffered, so a
    /// lying header cannot grow the window past the message budget.
    ///
    /// # Errors
    ///
    /// Same as [`read_frame`](Self::read_frame), plus:
    /// - `Error::MessageTooLarge` if a data frame would take the message past
    ///   `max_message_size`
    /// - `Error::ControlFrameTooLarge` for control frames over 125 bytes
    pub fn read_message_frame(
        &mut self,
        assembled: usize,
        max_message_size: usize,
    ) -> Result<Frame<'_>> {
        self.read_frame_within(Some((assembled, max_message_size)))
    }

    fn read_frame_within(&mut self, budget: Option<(usize, usize)>) -> Result<Frame<'_>> {
        if self.window.capacity() - self.window.read_pos() < MAX_HEADER_SIZE {
            self.window.compact();
        }

        while self.window.buffered() < 2 {
            self.window.fill_from(&mut self.inner)?;
        }
        let needed = header_len(self.window.unread()[1]);
        while self.window.buffered() < needed {
            self.window.fill_from(&mut self.inner)?;
        }

        let (header, consumed) = decode_header(self.window.unread())?;
        self.window.consume(consumed);
        trace!(
            "frame header: opcode={} fin={} rsv1={} mask={} len={}",
            header.opcode, header.fin, header.rsv1, header.mask, header.payload_len
        );

        self.limits.check_payload_size(header.payload_len)?;
        if let Some((assembled, max_message_size)) = budget {
            check_message_budget(&header, assembled, max_message_size)?;
        }

        let payload_len = usize::try_from(header.payload_len)
            .ok()
            .filter(|len| len.checked_add(MAX_HEADER_SIZE).is_some())
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: header.payload_len,
            })?;

        let buffered = self.window.buffered();
        if payload_len > buffered {
            let shortfall = payload_len - buffered;
            if shortfall > self.window.available() {
                self.window
                    .ensure_capacity(payload_len + MAX_HEADER_SIZE, self.growth_factor);
            } else if shortfall > self.window.write_capacity() {
                self.window.compact();
            }
            self.window.read_exact_into_tail(&mut self.inner, shortfall)?;
        }

        let payload = self.window.take(payload_len);
        if header.mask {
            apply_mask(payload, header.mask_key);
        }

        Ok(Frame::new(header, payload))
    }

    /// Number of times the window has been replaced by a larger buffer.
    #[must_use]
    pub fn reallocations(&self) -> usize {
        self.window.reallocations()
    }

    /// Current window size in bytes.
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Bytes read from the transport but not yet returned as frames.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        self.window.unread()
    }

    /// Shared reference to the transport.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutable reference to the transport.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Recover the transport, dropping any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn check_message_budget(header: &FrameHeader, assembled: usize, max: usize) -> Result<()> {
    let declared = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
    if header.opcode.is_control() {
        if declared > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(declared));
        }
        return Ok(());
    }

    let size = assembled.saturating_add(declared);
    if size > max {
        return Err(Error::MessageTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::pool::SizeClassPool;
    use crate::protocol::OpCode;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reader(data: Vec<u8>) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(Cursor::new(data), SizeClassPool::shared(), &Config::default())
    }

    #[test]
    fn test_read_unmasked_text_frame() {
        let mut r = reader(vec![0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
        let frame = r.read_frame().unwrap();
        assert!(frame.fin());
        assert_eq!(frame.opcode(), OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_read_masked_text_frame() {
        let mut r = reader(vec![
            0x81, 0x85, // FIN + Text, MASK + len=5
            0x37, 0xfa, 0x21, 0x3d, // Mask key
            0x7f, 0x9f, 0x4d, 0x51, 0x58, // Masked "Hello"
        ]);
        let frame = r.read_frame().unwrap();
        assert!(frame.header().mask);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn test_read_fragmented_sequence() {
        let mut r = reader(vec![
            0x01, 0x03, b'H', b'e', b'l', // Text, FIN=0
            0x89, 0x00, // Ping between fragments
            0x80, 0x02, b'l', b'o', // Continuation, FIN=1
        ]);

        let first = r.read_frame().unwrap();
        assert!(!first.fin());
        assert_eq!(first.payload(), b"Hel");

        let ping = r.read_frame().unwrap();
        assert_eq!(ping.opcode(), OpCode::Ping);
        assert!(ping.payload().is_empty());

        let last = r.read_frame().unwrap();
        assert_eq!(last.opcode(), OpCode::Continuation);
        assert_eq!(last.payload(), b"lo");
    }

    #[test]
    fn test_read_empty_transport() {
        let mut r = reader(Vec::new());
        assert_eq!(r.read_frame().unwrap_err(), Error::UnexpectedEof);
    }

    #[test]
    fn test_read_truncated_payload() {
        let mut r = reader(vec![0x82, 0x05, 1, 2]);
        assert_eq!(r.read_frame().unwrap_err(), Error::UnexpectedEof);
    }

    #[test]
    fn test_read_payload_over_limit() {
        let config = Config::default().with_limits(Limits {
            max_payload_size: 4,
            ..Limits::default()
        });
        let data = vec![0x82, 0x05, 1, 2, 3, 4, 5];
        let mut r = FrameReader::new(Cursor::new(data), SizeClassPool::shared(), &config);
        assert_eq!(
            r.read_frame().unwrap_err(),
            Error::TooLargePayload { size: 5, max: 4 }
        );
    }

    #[test]
    fn test_read_large_frame_reallocates_once() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut data = vec![0x82, 0x7E];
        data.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        data.extend_from_slice(&payload);

        let mut r = reader(data);
        let frame = r.read_frame().unwrap();
        assert_eq!(frame.payload(), &payload[..]);
        assert_eq!(r.reallocations(), 1);
    }

    #[test]
    fn test_read_many_small_frames_compacts() {
        let mut data = Vec::new();
        for i in 0..500u32 {
            data.extend_from_slice(&[0x82, 0x05]);
            data.extend_from_slice(&[i as u8; 5]);
        }
        let mut r = reader(data);
        for i in 0..500u32 {
            let frame = r.read_frame().unwrap();
            assert_eq!(frame.payload(), &[i as u8; 5]);
        }
        assert_eq!(r.reallocations(), 0);
        assert!(r.buffered().is_empty());
    }

    /// Pool that remembers the largest request it served.
    #[derive(Default)]
    struct RecordingPool {
        largest: AtomicUsize,
    }

    impl BufferPool for RecordingPool {
        fn acquire(&self, min_size: usize) -> Vec<u8> {
            self.largest.fetch_max(min_size, Ordering::SeqCst);
            vec![0; min_size]
        }

        fn release(&self, _buf: Vec<u8>) {}
    }

    fn lying_header(len: u64) -> Vec<u8> {
        let mut data = vec![0x82, 0x7F];
        data.extend_from_slice(&len.to_be_bytes());
        data
    }

    #[test]
    fn test_default_limits_reject_huge_declared_length() {
        let pool = Arc::new(RecordingPool::default());
        let mut r = FrameReader::new(
            Cursor::new(lying_header(1 << 30)),
            pool.clone(),
            &Config::default(),
        );

        assert_eq!(
            r.read_frame().unwrap_err(),
            Error::TooLargePayload {
                size: 1 << 30,
                max: 16 * 1024 * 1024
            }
        );
        assert_eq!(pool.largest.load(Ordering::SeqCst), Config::default().read_buffer_size);
    }

    #[test]
    fn test_message_budget_checked_before_buffering() {
        let config = Config::default().with_limits(Limits {
            max_payload_size: 0,
            ..Limits::default()
        });
        let pool = Arc::new(RecordingPool::default());
        let mut r = FrameReader::new(Cursor::new(lying_header(1 << 50)), pool.clone(), &config);

        let max = config.limits.max_message_size;
        assert_eq!(
            r.read_message_frame(0, max).unwrap_err(),
            Error::MessageTooLarge { size: 1 << 50, max }
        );
        assert_eq!(r.reallocations(), 0);
        assert_eq!(pool.largest.load(Ordering::SeqCst), config.read_buffer_size);
    }

    #[test]
    fn test_message_budget_counts_assembled_bytes() {
        let mut r = reader(vec![0x80, 0x05, 1, 2, 3, 4, 5]);
        assert_eq!(
            r.read_message_frame(96, 100).unwrap_err(),
            Error::MessageTooLarge { size: 101, max: 100 }
        );

        let mut r = reader(vec![0x80, 0x04, 1, 2, 3, 4]);
        assert_eq!(r.read_message_frame(96, 100).unwrap().payload(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_message_budget_control_frames() {
        // control frames ignore the data budget but stay within 125 bytes
        let mut r = reader(vec![0x89, 0x02, b'h', b'i']);
        assert_eq!(r.read_message_frame(100, 100).unwrap().payload(), b"hi");

        let mut r = reader(vec![0x89, 0x7E, 0x00, 0x7E]);
        assert_eq!(
            r.read_message_frame(0, 1 << 20).unwrap_err(),
            Error::ControlFrameTooLarge(126)
        );
    }
}
