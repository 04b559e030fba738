//! Error types for the WebSocket wire codec.
//!
//! Every fallible operation in the crate returns [`Result`]. Broken internal
//! invariants (for example rebinding a window to a buffer that cannot hold its
//! unread bytes) are not represented here: they panic.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, writing or compressing frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The transport ended before a declared field was complete.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Unrecognized extension token or window bits outside 8..=15.
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    /// The deflate encoder did not end its output with the sync marker.
    #[error("internal error, unexpected bytes at end of flate stream")]
    UnexpectedFlateStream,

    /// Decompressed message exceeds the configured cap.
    #[error("message too big: decompressed size exceeds {max} bytes")]
    TooBigMessage {
        /// Configured maximum.
        max: usize,
    },

    /// Write attempted after the writer was closed.
    #[error("write on closed writer")]
    WriteClosed,

    /// Declared frame payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max: {max})")]
    TooLargePayload {
        /// Declared payload length.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// The 64-bit payload length does not fit this platform.
    #[error("payload length {size} does not fit this platform")]
    PayloadTooLargeForPlatform {
        /// Declared payload length.
        size: u64,
    },

    /// Reassembled message exceeds the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size reached so far.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Fragment count reached.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Frame sequence or flags break RFC 6455 rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Control frame payload larger than 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// The deflate library reported a failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// Transport error other than end of stream.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(err.to_string()),
        }
    }
}

#[cfg(feature = "compression")]
impl From<flate2::CompressError> for Error {
    fn from(err: flate2::CompressError) -> Self {
        Error::Compression(err.to_string())
    }
}

#[cfg(feature = "compression")]
impl From<flate2::DecompressError> for Error {
    fn from(err: flate2::DecompressError) -> Self {
        Error::Compression(err.to_string())
    }
}
