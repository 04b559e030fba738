//! Reassembly of fragmented data messages (RFC 6455 §5.4).

use bytes::{Bytes, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Collects data frames until a frame with FIN completes the message.
///
/// Control frames are not handled here; the caller returns them before
/// pushing anything.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    compressed: bool,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            compressed: false,
            limits,
        }
    }

    /// Add one data frame to the message being assembled.
    ///
    /// Returns `Some` once a frame with `fin` set completes the message.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with nothing to
    ///   continue, a new data frame before the previous message finished,
    ///   rsv1 on a continuation frame, or a control or reserved opcode
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` when a limit is
    ///   exceeded
    pub fn push(
        &mut self,
        opcode: OpCode,
        fin: bool,
        rsv1: bool,
        payload: &[u8],
    ) -> Result<Option<AssembledMessage>> {
        match opcode {
            OpCode::Continuation => {
                if self.opcode.is_none() {
                    return Err(Error::ProtocolViolation(
                        "Unexpected continuation frame".into(),
                    ));
                }
                if rsv1 {
                    return Err(Error::ProtocolViolation(
                        "RSV1 set on continuation frame".into(),
                    ));
                }
            }
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(Error::ProtocolViolation(
                        "Expected continuation frame".into(),
                    ));
                }
                self.opcode = Some(opcode);
                self.compressed = rsv1;
            }
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "{other} frame is not a data frame"
                )));
            }
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        let new_size = self.buffer.len() + payload.len();
        self.limits.check_message_size(new_size)?;

        self.buffer.extend_from_slice(payload);
        self.fragment_count += 1;

        if !fin {
            return Ok(None);
        }

        let Some(opcode) = self.opcode.take() else {
            return Err(Error::ProtocolViolation("No message in progress".into()));
        };
        let message = AssembledMessage {
            opcode,
            payload: std::mem::take(&mut self.buffer).freeze(),
            compressed: self.compressed,
        };
        self.fragment_count = 0;
        self.compressed = false;
        Ok(Some(message))
    }

    /// Bytes collected so far for the message in progress.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
        self.compressed = false;
    }
}

/// A complete data message as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// `Text` or `Binary`, taken from the first frame.
    pub opcode: OpCode,
    /// Concatenated frame payloads, handed over without copying.
    pub payload: Bytes,
    /// rsv1 was set on the first frame.
    pub compressed: bool,
}
