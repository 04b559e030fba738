//! Permessage-deflate payload compression (RFC 7692).
//!
//! Each direction of a connection owns one codec. The raw deflate stream is
//! reset before every message; with context takeover it is then seeded with
//! a [`HistoryDict`] of the bytes previous messages carried, so both ends
//! keep the same LZ77 window without keeping one long-lived stream.
//!
//! RFC 7692 Section 7.2.1 requires each compressed message to end with an
//! empty stored block whose last four bytes (`00 00 FF FF`) are stripped on
//! send and restored on receive.

pub mod history;

pub use history::HistoryDict;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::trace;

use crate::error::{Error, Result};
use crate::extensions::deflate::PermessageDeflateConfig;
use crate::role::Role;

/// Trailer of a sync-flushed deflate block.
pub const SYNC_MARKER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Default deflate level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;

/// zlib refuses to emit raw deflate with a 256-byte window.
const MIN_ENCODER_WINDOW_BITS: u8 = 9;

const MIN_OUTPUT_RESERVE: usize = 4096;

/// Compresses outgoing message payloads.
pub struct Compressor {
    stream: Compress,
    history: Option<HistoryDict>,
    window_bits: u8,
}

impl Compressor {
    /// Create a compressor.
    ///
    /// `window_bits` is clamped to 8..=15; the encoder itself never uses
    /// fewer than 9 bits. With `context_takeover` the last `2^window_bits`
    /// bytes of input are carried into the next message.
    #[must_use]
    pub fn new(level: u32, window_bits: u8, context_takeover: bool) -> Self {
        let window_bits = window_bits.clamp(8, 15);
        // zlib has no 256-byte raw deflate window, so an agreed 8 bits is
        // encoded with 9 (as other zlib-based endpoints do). Decoders here
        // always run with 15 bits. The carried history keeps 2^window_bits.
        let stream = Compress::new_with_window_bits(
            Compression::new(level.min(9)),
            false,
            window_bits.max(MIN_ENCODER_WINDOW_BITS),
        );
        Self {
            stream,
            history: context_takeover.then(|| HistoryDict::new(window_bits)),
            window_bits,
        }
    }

    /// Whether history is kept across messages.
    #[must_use]
    pub fn context_takeover(&self) -> bool {
        self.history.is_some()
    }

    /// Negotiated window exponent.
    #[must_use]
    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Bytes of history the next message will be compressed against.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, HistoryDict::len)
    }

    /// Compress one message payload.
    ///
    /// The returned bytes lack the trailing sync marker.
    ///
    /// # Errors
    ///
    /// - `Error::UnexpectedFlateStream` if the encoder output does not end
    ///   with the sync marker
    /// - `Error::Compression` if the deflate library fails
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.stream.reset();
        if let Some(history) = self.history.as_mut() {
            if !history.is_empty() {
                self.stream.set_dictionary(history.as_slice())?;
            }
        }

        let mut out = Vec::with_capacity(payload.len() + 64);
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(MIN_OUTPUT_RESERVE));
            }
            let before_in = self.stream.total_in();
            self.stream
                .compress_vec(&payload[consumed..], &mut out, FlushCompress::Sync)?;
            consumed += (self.stream.total_in() - before_in) as usize;

            // A sync flush is complete once it stops filling the output.
            if consumed >= payload.len() && out.len() < out.capacity() {
                break;
            }
        }

        if out.len() < SYNC_MARKER.len() || !out.ends_with(&SYNC_MARKER) {
            return Err(Error::UnexpectedFlateStream);
        }
        out.truncate(out.len() - SYNC_MARKER.len());

        if let Some(history) = self.history.as_mut() {
            history.write(payload);
        }
        trace!("compressed {} bytes to {}", payload.len(), out.len());
        Ok(out)
    }
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("window_bits", &self.window_bits)
            .field("context_takeover", &self.context_takeover())
            .field("history_len", &self.history_len())
            .finish()
    }
}

/// Bounds the decompressed size of one message.
///
/// A maximum of 0 disables the bound.
#[derive(Debug, Clone, Copy)]
pub struct SizeGuard {
    max: usize,
}

impl SizeGuard {
    /// Create a guard for `max` bytes.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self { max }
    }

    /// Fail once `produced` exceeds the bound.
    ///
    /// # Errors
    ///
    /// Returns `Error::TooBigMessage` when over the bound.
    pub const fn check(&self, produced: usize) -> Result<()> {
        if self.max > 0 && produced > self.max {
            Err(Error::TooBigMessage { max: self.max })
        } else {
            Ok(())
        }
    }

    /// Grow `out` for the next inflate step without letting it run more than
    /// one byte past the bound.
    fn reserve(&self, out: &mut Vec<u8>) {
        let mut additional = out.capacity().max(MIN_OUTPUT_RESERVE);
        if self.max > 0 {
            additional = additional.min((self.max + 1).saturating_sub(out.len()).max(1));
        }
        out.reserve_exact(additional);
    }
}

/// Decompresses incoming message payloads.
pub struct Decompressor {
    stream: Decompress,
    history: Option<HistoryDict>,
    window_bits: u8,
}

impl Decompressor {
    /// Create a decompressor.
    ///
    /// The inflater always runs with a 32 KiB window, which accepts any peer
    /// window; `window_bits` only sizes the history kept with
    /// `context_takeover`.
    #[must_use]
    pub fn new(window_bits: u8, context_takeover: bool) -> Self {
        let window_bits = window_bits.clamp(8, 15);
        Self {
            stream: Decompress::new(false),
            history: context_takeover.then(|| HistoryDict::new(window_bits)),
            window_bits,
        }
    }

    /// Whether history is kept across messages.
    #[must_use]
    pub fn context_takeover(&self) -> bool {
        self.history.is_some()
    }

    /// Negotiated window exponent.
    #[must_use]
    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Bytes of history the next message will be inflated against.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, HistoryDict::len)
    }

    /// Decompress one message payload received without its sync marker.
    ///
    /// # Errors
    ///
    /// - `Error::TooBigMessage` if the output exceeds a non-zero
    ///   `max_message_size`
    /// - `Error::Compression` if the payload is not valid deflate data
    pub fn decompress(&mut self, payload: &[u8], max_message_size: usize) -> Result<Vec<u8>> {
        self.stream.reset(false);
        if let Some(history) = self.history.as_mut() {
            if !history.is_empty() {
                self.stream.set_dictionary(history.as_slice())?;
            }
        }

        let guard = SizeGuard::new(max_message_size);
        let mut input = Vec::with_capacity(payload.len() + SYNC_MARKER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&SYNC_MARKER);

        let mut out = Vec::with_capacity(payload.len().saturating_mul(2).max(64));
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                guard.reserve(&mut out);
            }
            let before_in = self.stream.total_in();
            let before_out = self.stream.total_out();
            let status =
                self.stream
                    .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)?;
            let read = (self.stream.total_in() - before_in) as usize;
            let written = (self.stream.total_out() - before_out) as usize;
            consumed += read;

            guard.check(out.len())?;

            let has_room = out.len() < out.capacity();
            match status {
                Status::StreamEnd => break,
                _ if consumed >= input.len() && has_room => break,
                _ if read == 0 && written == 0 && has_room => {
                    return Err(Error::Compression("inflate made no progress".into()));
                }
                _ => {}
            }
        }

        if let Some(history) = self.history.as_mut() {
            history.write(&out);
        }
        trace!("decompressed {} bytes to {}", payload.len(), out.len());
        Ok(out)
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("window_bits", &self.window_bits)
            .field("context_takeover", &self.context_takeover())
            .field("history_len", &self.history_len())
            .finish()
    }
}

/// The codec pair selected by a negotiated configuration.
#[derive(Debug, Default)]
pub struct DeflateContext {
    /// Codec for outgoing messages.
    pub compressor: Option<Compressor>,
    /// Codec for incoming messages.
    pub decompressor: Option<Decompressor>,
}

impl DeflateContext {
    /// Build the codecs for `role`.
    ///
    /// A server compresses with the `server_*` parameters and decompresses
    /// with the `client_*` ones; a client does the opposite. A disabled
    /// configuration yields neither codec.
    #[must_use]
    pub fn new(config: &PermessageDeflateConfig, role: Role, level: u32) -> Self {
        if !config.enable {
            return Self::default();
        }

        let (own_bits, own_takeover, peer_bits, peer_takeover) = match role {
            Role::Server => (
                config.server_max_window_bits,
                config.server_context_takeover,
                config.client_max_window_bits,
                config.client_context_takeover,
            ),
            Role::Client => (
                config.client_max_window_bits,
                config.client_context_takeover,
                config.server_max_window_bits,
                config.server_context_takeover,
            ),
        };

        Self {
            compressor: config
                .compression
                .then(|| Compressor::new(level, own_bits, own_takeover)),
            decompressor: config
                .decompression
                .then(|| Decompressor::new(peer_bits, peer_takeover)),
        }
    }

    /// Codecs using the RFC 7692 defaults.
    #[must_use]
    pub fn with_defaults(role: Role) -> Self {
        Self::new(&PermessageDeflateConfig::enabled(), role, DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_without_context_takeover() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 15, false);
        let mut dec = Decompressor::new(15, false);

        for repeat in [1, 13] {
            let payload = "hello".repeat(repeat).into_bytes();
            let compressed = enc.compress(&payload).unwrap();
            assert!(!compressed.ends_with(&SYNC_MARKER));
            assert_eq!(dec.decompress(&compressed, 0).unwrap(), payload);
        }
        assert_eq!(enc.history_len(), 0);
        assert_eq!(dec.history_len(), 0);
    }

    #[test]
    fn test_roundtrip_with_context_takeover() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 15, true);
        let mut dec = Decompressor::new(15, true);

        let first = b"The quick brown fox jumps over the lazy dog".to_vec();
        let c1 = enc.compress(&first).unwrap();
        assert_eq!(dec.decompress(&c1, 0).unwrap(), first);

        let c2 = enc.compress(&first).unwrap();
        // second copy is mostly a back-reference into history
        assert!(c2.len() < c1.len());
        assert_eq!(dec.decompress(&c2, 0).unwrap(), first);
        assert_eq!(enc.history_len(), first.len() * 2);
        assert_eq!(dec.history_len(), first.len() * 2);
    }

    #[test]
    fn test_takeover_stream_needs_history() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 15, true);
        let payload = b"abcabcabcabcabcabcabcabc".to_vec();
        enc.compress(&payload).unwrap();
        let second = enc.compress(&payload).unwrap();

        let mut fresh = Decompressor::new(15, false);
        assert!(fresh.decompress(&second, 0).map_or(true, |out| out != payload));
    }

    #[test]
    fn test_small_window() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 8, true);
        let mut dec = Decompressor::new(8, true);
        assert_eq!(enc.window_bits(), 8);

        let payload: Vec<u8> = (0..2000u32).map(|i| (i % 97) as u8).collect();
        for _ in 0..3 {
            let compressed = enc.compress(&payload).unwrap();
            assert_eq!(dec.decompress(&compressed, 0).unwrap(), payload);
        }
        assert_eq!(enc.history_len(), 256);
        assert_eq!(dec.history_len(), 256);
    }

    #[test]
    fn test_empty_payload() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 15, true);
        let mut dec = Decompressor::new(15, true);
        let compressed = enc.compress(b"").unwrap();
        assert!(dec.decompress(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_over_limit() {
        let mut enc = Compressor::new(DEFAULT_COMPRESSION_LEVEL, 15, false);
        let mut dec = Decompressor::new(15, true);
        let payload = vec![b'a'; 100_000];
        let compressed = enc.compress(&payload).unwrap();

        assert_eq!(
            dec.decompress(&compressed, 1000),
            Err(Error::TooBigMessage { max: 1000 })
        );
        assert_eq!(dec.history_len(), 0);
        assert_eq!(dec.decompress(&compressed, 100_000).unwrap(), payload);
    }

    #[test]
    fn test_decompress_garbage() {
        let mut dec = Decompressor::new(15, false);
        assert!(matches!(
            dec.decompress(&[0xff, 0xff, 0xff, 0xff, 0xff], 0),
            Err(Error::Compression(_))
        ));
    }

    #[test]
    fn test_size_guard() {
        let guard = SizeGuard::new(10);
        assert!(guard.check(10).is_ok());
        assert_eq!(guard.check(11), Err(Error::TooBigMessage { max: 10 }));
        assert!(SizeGuard::new(0).check(usize::MAX).is_ok());
    }

    #[test]
    fn test_context_roles() {
        let config = PermessageDeflateConfig::enabled()
            .server_context_takeover(false)
            .client_max_window_bits(10)
            .unwrap();

        let server = DeflateContext::new(&config, Role::Server, 1);
        let server_enc = server.compressor.as_ref().unwrap();
        let server_dec = server.decompressor.as_ref().unwrap();
        assert!(!server_enc.context_takeover());
        assert_eq!(server_enc.window_bits(), 15);
        assert!(server_dec.context_takeover());
        assert_eq!(server_dec.window_bits(), 10);

        let client = DeflateContext::new(&config, Role::Client, 1);
        assert_eq!(client.compressor.as_ref().unwrap().window_bits(), 10);
        assert!(!client.decompressor.as_ref().unwrap().context_takeover());
    }

    #[test]
    fn test_context_disabled() {
        let ctx = DeflateContext::new(&PermessageDeflateConfig::default(), Role::Server, 1);
        assert!(ctx.compressor.is_none());
        assert!(ctx.decompressor.is_none());
    }

    #[test]
    fn test_server_to_client_with_defaults() {
        let mut server = DeflateContext::with_defaults(Role::Server);
        let mut client = DeflateContext::with_defaults(Role::Client);
        let enc = server.compressor.as_mut().unwrap();
        let dec = client.decompressor.as_mut().unwrap();

        for msg in ["first message", "second message", "first message"] {
            let compressed = enc.compress(msg.as_bytes()).unwrap();
            assert_eq!(dec.decompress(&compressed, 0).unwrap(), msg.as_bytes());
        }
    }
}
