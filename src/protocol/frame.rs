//! Decoded frames borrowed from a reader's receive window.

use crate::protocol::OpCode;
use crate::protocol::header::FrameHeader;

/// A frame whose payload lives in the reader's window.
///
/// The payload is already unmasked. It stays valid until the next call to
/// [`FrameReader::read_frame`](crate::protocol::FrameReader::read_frame);
/// copy it with [`Frame::to_vec`] to keep it longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    header: FrameHeader,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub(crate) fn new(header: FrameHeader, payload: &'a [u8]) -> Self {
        Self { header, payload }
    }

    /// The decoded header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Unmasked payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Final fragment flag.
    #[inline]
    #[must_use]
    pub fn fin(&self) -> bool {
        self.header.fin
    }

    /// RSV1 flag, set on the first frame of a compressed message.
    #[inline]
    #[must_use]
    pub fn rsv1(&self) -> bool {
        self.header.rsv1
    }

    /// Frame opcode.
    #[inline]
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Copy the payload out of the window.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.payload.to_vec()
    }
}
