//! Configuration and limits for frame readers and writers.

use crate::protocol::header::MAX_HEADER_SIZE;

/// Resource limits applied while reading.
///
/// These limits bound memory use on the receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum declared payload of a single frame in bytes.
    ///
    /// Checked against the header before the receive window grows. `0`
    /// disables the check.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_payload_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// Applies to the reassembled payload and, for compressed messages, to the
    /// decompressed size.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_payload_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
    ) -> Self {
        Self {
            max_payload_size,
            max_message_size,
            max_fragment_count,
        }
    }

    /// Limits suitable for small embedded systems.
    ///
    /// - Max payload: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_payload_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
        }
    }

    /// Validate a declared frame payload length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooLargePayload`](crate::Error::TooLargePayload) if `size` exceeds a non-zero maximum.
    pub const fn check_payload_size(&self, size: u64) -> Result<(), crate::Error> {
        if self.max_payload_size > 0 && size > self.max_payload_size as u64 {
            Err(crate::Error::TooLargePayload {
                size,
                max: self.max_payload_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }
}

/// Codec configuration for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Initial size of the receive window in bytes.
    ///
    /// Default: 1 KB plus one maximal frame header
    pub read_buffer_size: usize,

    /// Multiplier applied to the required size when the receive window grows.
    ///
    /// Values below 1.0 are treated as 1.0.
    ///
    /// Default: 1.0
    pub growth_factor: f32,

    /// Fragment size for outgoing messages (in bytes).
    ///
    /// Messages larger than this are split into multiple frames.
    ///
    /// Default: 16 KB (16 * 1024)
    pub fragment_size: usize,

    /// Deflate level 0-9 used when permessage-deflate is negotiated.
    ///
    /// Default: 1
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 1024 + MAX_HEADER_SIZE,
            growth_factor: 1.0,
            fragment_size: 16 * 1024,
            compression_level: 1,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the initial receive window size.
    ///
    /// The window never starts smaller than one maximal frame header.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(MAX_HEADER_SIZE);
        self
    }

    /// Set the receive window growth factor.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set the deflate level, clamped to 0-9.
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Growth factor with the lower bound applied.
    #[must_use]
    pub fn effective_growth_factor(&self) -> f32 {
        if self.growth_factor.is_finite() && self.growth_factor > 1.0 {
            self.growth_factor
        } else {
            1.0
        }
    }

    /// Configuration for the server side of a connection.
    ///
    /// Same as the default: single frames are capped at 16 MB.
    #[must_use]
    pub fn server() -> Self {
        Self::default()
    }

    /// Configuration for the client side of a connection.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }
}
