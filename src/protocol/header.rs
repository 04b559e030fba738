//! Frame header encoding and decoding (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                    Masking key (if present)                   |
//! +---------------------------------------------------------------+
//! ```

use std::io::Read;

use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Largest possible header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0x80;
const RSV1_BIT: u8 = 0x40;
const RSV2_BIT: u8 = 0x20;
const RSV3_BIT: u8 = 0x10;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;

const LEN_16_MARKER: u8 = 126;
const LEN_64_MARKER: u8 = 127;

/// Decoded frame header.
///
/// `mask_key` is meaningless when `mask` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1 (permessage-deflate "compressed" flag).
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the payload is masked.
    pub mask: bool,
    /// Little-endian value of the 4 mask key bytes.
    pub mask_key: u32,
    /// Payload length in bytes, never above `i64::MAX`.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Header for an unmasked final frame.
    #[must_use]
    pub const fn new(opcode: OpCode, payload_len: u64) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: false,
            mask_key: 0,
            payload_len,
        }
    }

    /// Number of bytes this header occupies on the wire.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let base = if self.payload_len <= 125 {
            2
        } else if self.payload_len <= 0xFFFF {
            4
        } else {
            10
        };
        if self.mask { base + 4 } else { base }
    }

    /// Encode into `buf`, returning the number of bytes written.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`MAX_HEADER_SIZE`].
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        encode_header(
            buf,
            self.fin,
            self.rsv1,
            self.rsv2,
            self.rsv3,
            self.opcode,
            self.payload_len,
            self.mask,
            self.mask_key,
        )
    }
}

/// Total header size implied by the second header byte.
#[inline]
#[must_use]
pub const fn header_len(byte1: u8) -> usize {
    let base = match byte1 & LEN_MASK {
        LEN_16_MARKER => 4,
        LEN_64_MARKER => 10,
        _ => 2,
    };
    if byte1 & MASK_BIT != 0 { base + 4 } else { base }
}

/// Decode a header from the front of `input`.
///
/// Returns the header and the number of bytes it occupied.
///
/// # Errors
///
/// - `Error::UnexpectedEof` if `input` ends before a declared field
/// - `Error::PayloadTooLargeForPlatform` if the 64-bit length has its top bit set
pub fn decode_header(input: &[u8]) -> Result<(FrameHeader, usize)> {
    if input.len() < 2 {
        return Err(Error::UnexpectedEof);
    }

    let byte0 = input[0];
    let byte1 = input[1];
    let total = header_len(byte1);
    if input.len() < total {
        return Err(Error::UnexpectedEof);
    }

    let (payload_len, mut offset) = match byte1 & LEN_MASK {
        LEN_16_MARKER => (u64::from(u16::from_be_bytes([input[2], input[3]])), 4),
        LEN_64_MARKER => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&input[2..10]);
            let len = u64::from_be_bytes(raw);
            if len > i64::MAX as u64 {
                return Err(Error::PayloadTooLargeForPlatform { size: len });
            }
            (len, 10)
        }
        short => (u64::from(short), 2),
    };

    let mask = byte1 & MASK_BIT != 0;
    let mask_key = if mask {
        let key = u32::from_le_bytes([
            input[offset],
            input[offset + 1],
            input[offset + 2],
            input[offset + 3],
        ]);
        offset += 4;
        key
    } else {
        0
    };

    let header = FrameHeader {
        fin: byte0 & FIN_BIT != 0,
        rsv1: byte0 & RSV1_BIT != 0,
        rsv2: byte0 & RSV2_BIT != 0,
        rsv3: byte0 & RSV3_BIT != 0,
        opcode: OpCode::from_u8(byte0 & OPCODE_MASK),
        mask,
        mask_key,
        payload_len,
    };
    debug_assert_eq!(offset, total);

    Ok((header, total))
}

/// Read and decode one header directly from a transport.
///
/// Reads exactly the header bytes and nothing of the payload.
///
/// # Errors
///
/// - `Error::UnexpectedEof` if the transport ends mid-header
/// - `Error::Io` for other transport failures
/// - `Error::PayloadTooLargeForPlatform` as in [`decode_header`]
pub fn read_header<R: Read>(r: &mut R, scratch: &mut [u8; MAX_HEADER_SIZE]) -> Result<FrameHeader> {
    r.read_exact(&mut scratch[..2])?;
    let total = header_len(scratch[1]);
    if total > 2 {
        r.read_exact(&mut scratch[2..total])?;
    }
    let (header, _) = decode_header(&scratch[..total])?;
    Ok(header)
}

/// Encode a header into `buf`, returning the number of bytes written.
///
/// The first [`MAX_HEADER_SIZE`] bytes of `buf` are zeroed before encoding.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`MAX_HEADER_SIZE`].
#[allow(clippy::too_many_arguments)]
pub fn encode_header(
    buf: &mut [u8],
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    payload_len: u64,
    mask: bool,
    mask_key: u32,
) -> usize {
    assert!(
        buf.len() >= MAX_HEADER_SIZE,
        "header buffer must hold {} bytes, got {}",
        MAX_HEADER_SIZE,
        buf.len()
    );
    buf[..MAX_HEADER_SIZE].fill(0);

    let mut byte0 = opcode.as_u8();
    if fin {
        byte0 |= FIN_BIT;
    }
    if rsv1 {
        byte0 |= RSV1_BIT;
    }
    if rsv2 {
        byte0 |= RSV2_BIT;
    }
    if rsv3 {
        byte0 |= RSV3_BIT;
    }
    buf[0] = byte0;

    let mask_flag = if mask { MASK_BIT } else { 0 };
    let mut offset = if payload_len <= 125 {
        buf[1] = mask_flag | payload_len as u8;
        2
    } else if payload_len <= 0xFFFF {
        buf[1] = mask_flag | LEN_16_MARKER;
        buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        buf[1] = mask_flag | LEN_64_MARKER;
        buf[2..10].copy_from_slice(&payload_len.to_be_bytes());
        10
    };

    if mask {
        buf[offset..offset + 4].copy_from_slice(&mask_key.to_le_bytes());
        offset += 4;
    }

    offset
}
