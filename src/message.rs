//! Whole-message reading and writing on top of the frame codec.
//!
//! [`MessageReader`] turns a frame stream back into messages: control frames
//! come out as soon as they arrive, data frames are reassembled and, when rsv1
//! marks them compressed, inflated. [`MessageWriter`] does the reverse.

use std::io::{Read, Write};
use std::sync::Arc;

use log::trace;

#[cfg(feature = "compression")]
use crate::compression::{Compressor, Decompressor, DeflateContext};
use crate::config::{Config, Limits};
use crate::error::{Error, Result};
use crate::pool::BufferPool;
use crate::protocol::header::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::{FrameReader, FrameWriter, MessageAssembler, MessageFragmenter, OpCode};
use crate::role::Role;

/// A complete message: one control frame or a reassembled data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `Text`, `Binary`, `Close`, `Ping` or `Pong`.
    pub opcode: OpCode,
    /// Application payload, already unmasked and decompressed.
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message with the given opcode and payload.
    #[must_use]
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::new(OpCode::Text, s.into().into_bytes())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    /// Create a ping message.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Ping, data)
    }

    /// Create a pong message.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Pong, data)
    }

    /// Create a close message with a status code and UTF-8 reason.
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload)
    }

    /// Whether this is a Close, Ping or Pong message.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// The payload as text, for `Text` messages holding valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if self.opcode == OpCode::Text {
            std::str::from_utf8(&self.payload).ok()
        } else {
            None
        }
    }

    /// Status code of a `Close` message, if it carries one.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match (self.opcode, self.payload.as_slice()) {
            (OpCode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Consume the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Reads whole messages from a transport.
#[derive(Debug)]
pub struct MessageReader<R> {
    frames: FrameReader<R>,
    assembler: MessageAssembler,
    #[cfg(feature = "compression")]
    decompressor: Option<Decompressor>,
    role: Role,
    limits: Limits,
}

impl<R: Read> MessageReader<R> {
    /// Create a reader without decompression.
    ///
    /// `role` is the local endpoint: a server requires masked frames and a
    /// client refuses them.
    pub fn new(inner: R, pool: Arc<dyn BufferPool>, role: Role, config: &Config) -> Self {
        Self {
            frames: FrameReader::new(inner, pool, config),
            assembler: MessageAssembler::new(config.limits.clone()),
            #[cfg(feature = "compression")]
            decompressor: None,
            role,
            limits: config.limits.clone(),
        }
    }

    /// Inflate messages that arrive with rsv1 set.
    #[cfg(feature = "compression")]
    #[must_use]
    pub fn with_decompressor(mut self, decompressor: Option<Decompressor>) -> Self {
        self.decompressor = decompressor;
        self
    }

    /// Read the next message.
    ///
    /// Control frames are returned as soon as they arrive, including between
    /// the fragments of a data message.
    ///
    /// # Errors
    ///
    /// - Any frame reader error
    /// - `Error::ProtocolViolation` for a frame masked the wrong way for
    ///   this role, rsv2/rsv3, reserved opcodes, a fragmented or compressed
    ///   control frame, rsv1 when no decompression was negotiated, or a
    ///   broken continuation sequence
    /// - `Error::ControlFrameTooLarge` for control payloads over 125 bytes
    /// - `Error::MessageTooLarge` / `Error::TooManyFragments` /
    ///   `Error::TooBigMessage` when a limit is exceeded
    ///
    /// Size limits are checked against each frame header before its payload
    /// is buffered.
    pub fn read_message(&mut self) -> Result<Message> {
        let accepts_compressed = self.accepts_compressed();
        let expects_masked = self.role.expects_masked();
        let max_message_size = self.limits.max_message_size;
        loop {
            let frame = self
                .frames
                .read_message_frame(self.assembler.buffered_len(), max_message_size)?;
            let header = *frame.header();

            if header.mask != expects_masked {
                return Err(Error::ProtocolViolation(if expects_masked {
                    "unmasked frame from client".into()
                } else {
                    "masked frame from server".into()
                }));
            }
            if header.rsv2 || header.rsv3 {
                return Err(Error::ProtocolViolation("RSV2/RSV3 must be 0".into()));
            }
            if header.opcode.is_reserved() {
                return Err(Error::ProtocolViolation(format!(
                    "reserved opcode {}",
                    header.opcode
                )));
            }

            if header.opcode.is_control() {
                if !header.fin {
                    return Err(Error::ProtocolViolation(
                        "fragmented control frame".into(),
                    ));
                }
                if header.rsv1 {
                    return Err(Error::ProtocolViolation(
                        "RSV1 set on control frame".into(),
                    ));
                }
                return Ok(Message::new(header.opcode, frame.payload()));
            }

            if header.rsv1 && !accepts_compressed {
                return Err(Error::ProtocolViolation(
                    "RSV1 set without negotiated compression".into(),
                ));
            }

            let assembled =
                self.assembler
                    .push(header.opcode, header.fin, header.rsv1, frame.payload())?;
            if let Some(assembled) = assembled {
                let payload = if assembled.compressed {
                    self.inflate(&assembled.payload)?
                } else {
                    Vec::from(assembled.payload)
                };
                trace!("message: opcode={} len={}", assembled.opcode, payload.len());
                return Ok(Message::new(assembled.opcode, payload));
            }
        }
    }

    #[cfg(feature = "compression")]
    fn accepts_compressed(&self) -> bool {
        self.decompressor.is_some()
    }

    #[cfg(not(feature = "compression"))]
    fn accepts_compressed(&self) -> bool {
        false
    }

    #[cfg(feature = "compression")]
    fn inflate(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let max = self.limits.max_message_size;
        match self.decompressor.as_mut() {
            Some(decompressor) => decompressor.decompress(payload, max),
            None => Err(Error::ProtocolViolation(
                "RSV1 set without negotiated compression".into(),
            )),
        }
    }

    #[cfg(not(feature = "compression"))]
    fn inflate(&mut self, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(Error::ProtocolViolation(
            "RSV1 set without negotiated compression".into(),
        ))
    }

    /// The local endpoint this reader serves.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Limits applied to incoming messages.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The underlying frame reader.
    pub fn frames(&self) -> &FrameReader<R> {
        &self.frames
    }

    /// Recover the transport, dropping buffered bytes and any partial message.
    pub fn into_inner(self) -> R {
        self.frames.into_inner()
    }
}

/// Writes whole messages to a transport.
#[derive(Debug)]
pub struct MessageWriter<W: Write> {
    frames: FrameWriter<W>,
    #[cfg(feature = "compression")]
    compressor: Option<Compressor>,
    role: Role,
    fragment_size: usize,
}

impl<W: Write> MessageWriter<W> {
    /// Create a writer without compression.
    ///
    /// Frames are masked with a fresh key when `role` is `Client`.
    pub fn new(inner: W, pool: Arc<dyn BufferPool>, role: Role, config: &Config) -> Self {
        Self {
            frames: FrameWriter::new(inner, pool),
            #[cfg(feature = "compression")]
            compressor: None,
            role,
            fragment_size: config.fragment_size,
        }
    }

    /// Deflate outgoing data messages and mark them with rsv1.
    #[cfg(feature = "compression")]
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Write one message.
    ///
    /// Data messages are compressed when a compressor is set and split into
    /// frames of at most `fragment_size` bytes. Control messages go out as a
    /// single uncompressed frame.
    ///
    /// # Errors
    ///
    /// - `Error::ControlFrameTooLarge` for control payloads over 125 bytes
    /// - `Error::ProtocolViolation` for `Continuation` or reserved opcodes
    /// - `Error::WriteClosed` after [`close`](Self::close)
    /// - `Error::Compression` / `Error::UnexpectedFlateStream` from the
    ///   compressor
    /// - `Error::Io` if the transport fails
    pub fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if opcode.is_control() {
            if opcode.is_reserved() {
                return Err(Error::ProtocolViolation(format!("reserved opcode {opcode}")));
            }
            if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(payload.len()));
            }
            return self
                .frames
                .write_frame(opcode, payload, true, false, self.role.next_mask_key());
        }
        if !matches!(opcode, OpCode::Text | OpCode::Binary) {
            return Err(Error::ProtocolViolation(format!(
                "cannot start a message with {opcode}"
            )));
        }

        let compressed = self.deflate(payload)?;
        let (body, rsv1) = match compressed.as_deref() {
            Some(deflated) => (deflated, true),
            None => (payload, false),
        };

        for fragment in MessageFragmenter::new(body, opcode, self.fragment_size) {
            self.frames.write_frame(
                fragment.opcode,
                fragment.payload,
                fragment.fin,
                rsv1 && fragment.is_first(),
                self.role.next_mask_key(),
            )?;
        }
        Ok(())
    }

    /// Write a [`Message`].
    ///
    /// # Errors
    ///
    /// See [`write_message`](Self::write_message).
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.write_message(message.opcode, &message.payload)
    }

    #[cfg(feature = "compression")]
    fn deflate(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        self.compressor
            .as_mut()
            .map(|compressor| compressor.compress(payload))
            .transpose()
    }

    #[cfg(not(feature = "compression"))]
    fn deflate(&mut self, _payload: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Flush the transport.
    ///
    /// # Errors
    ///
    /// Same as [`FrameWriter::flush`].
    pub fn flush(&mut self) -> Result<()> {
        self.frames.flush()
    }

    /// Flush and refuse further writes. Idempotent.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the final flush fails.
    pub fn close(&mut self) -> Result<()> {
        self.frames.close()
    }

    /// Role this writer masks for.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Recover the transport.
    pub fn into_inner(self) -> W {
        self.frames.into_inner()
    }
}

/// Build a reader and writer pair with the codecs of a negotiated
/// permessage-deflate configuration.
#[cfg(feature = "compression")]
pub fn split_with_deflate<R: Read, W: Write>(
    reader: R,
    writer: W,
    pool: Arc<dyn BufferPool>,
    role: Role,
    config: &Config,
    deflate: &crate::extensions::PermessageDeflateConfig,
) -> (MessageReader<R>, MessageWriter<W>) {
    let DeflateContext {
        compressor,
        decompressor,
    } = DeflateContext::new(deflate, role, config.compression_level);
    (
        MessageReader::new(reader, Arc::clone(&pool), role, config)
            .with_decompressor(decompressor),
        MessageWriter::new(writer, pool, role, config).with_compressor(compressor),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SizeClassPool;
    use crate::protocol::write_frame_to_vec;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_all(role: Role, config: &Config, messages: &[Message]) -> Vec<u8> {
        let mut writer = MessageWriter::new(Vec::new(), SizeClassPool::shared(), role, config);
        for msg in messages {
            writer.send(msg).unwrap();
        }
        writer.into_inner()
    }

    fn reader(bytes: Vec<u8>, role: Role, config: &Config) -> MessageReader<Cursor<Vec<u8>>> {
        MessageReader::new(Cursor::new(bytes), SizeClassPool::shared(), role, config)
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::text("hi").as_text(), Some("hi"));
        assert_eq!(Message::binary(vec![1]).as_text(), None);
        assert!(Message::ping(b"p".to_vec()).is_control());
        assert_eq!(Message::close(1000, "bye").close_code(), Some(1000));
        assert_eq!(Message::new(OpCode::Close, Vec::new()).close_code(), None);
    }

    #[test]
    fn test_roundtrip_fragmented_client_to_server() {
        let config = Config::new().with_fragment_size(4);
        let messages = [
            Message::text("hello world"),
            Message::ping(b"x".to_vec()),
            Message::binary(vec![0u8; 9]),
            Message::binary(Vec::new()),
        ];
        let wire = write_all(Role::Client, &config, &messages);

        let mut reader = reader(wire, Role::Server, &config);
        for expected in &messages {
            assert_eq!(&reader.read_message().unwrap(), expected);
        }
        assert_eq!(reader.read_message(), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_control_frame_between_fragments() {
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Text, b"Hel", false, false, None);
        write_frame_to_vec(&mut wire, OpCode::Ping, b"p", true, false, None);
        write_frame_to_vec(&mut wire, OpCode::Continuation, b"lo", true, false, None);

        let mut reader = reader(wire, Role::Client, &Config::new());
        assert_eq!(reader.read_message().unwrap(), Message::ping(b"p".to_vec()));
        assert_eq!(reader.read_message().unwrap(), Message::text("Hello"));
    }

    #[test]
    fn test_fragmented_control_frame_rejected() {
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Ping, b"p", false, false, None);

        let result = reader(wire, Role::Client, &Config::new()).read_message();
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_oversized_control_frame_rejected() {
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Pong, &[0u8; 126], true, false, None);

        let result = reader(wire, Role::Client, &Config::new()).read_message();
        assert_eq!(result, Err(Error::ControlFrameTooLarge(126)));
    }

    #[test]
    fn test_rsv1_without_decompression_rejected() {
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Binary, b"zz", true, true, None);

        let result = reader(wire, Role::Client, &Config::new()).read_message();
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_reserved_opcode_rejected() {
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Reserved(0xB), b"", true, false, None);

        let result = reader(wire, Role::Client, &Config::new()).read_message();
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_message_limit_applies() {
        let config = Config::new().with_limits(Limits::new(0, 8, 128));
        let wire = write_all(Role::Server, &config, &[Message::binary(vec![1u8; 9])]);

        let result = reader(wire, Role::Client, &config).read_message();
        assert_eq!(result, Err(Error::MessageTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn test_message_limit_counts_earlier_fragments() {
        let config = Config::new().with_limits(Limits::new(0, 8, 128));
        let mut wire = Vec::new();
        write_frame_to_vec(&mut wire, OpCode::Binary, &[1; 6], false, false, None);
        write_frame_to_vec(&mut wire, OpCode::Ping, b"p", true, false, None);
        write_frame_to_vec(&mut wire, OpCode::Continuation, &[2; 3], true, false, None);

        let mut reader = reader(wire, Role::Client, &config);
        assert_eq!(reader.read_message().unwrap(), Message::ping(b"p".to_vec()));
        assert_eq!(reader.read_message(), Err(Error::MessageTooLarge { size: 9, max: 8 }));
    }

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

    /// A binary frame header declaring `len` payload bytes and nothing else.
    fn bare_header(len: u64) -> Vec<u8> {
        let mut wire = vec![0x82, 0x7F];
        wire.extend_from_slice(&len.to_be_bytes());
        wire
    }

    #[test]
    fn test_huge_declared_length_never_allocated() {
        let pool = Arc::new(RecordingPool::default());
        let config = Config::default();
        let wire = Cursor::new(bare_header(1 << 30));
        let mut reader = MessageReader::new(wire, pool.clone(), Role::Client, &config);

        assert_eq!(
            reader.read_message(),
            Err(Error::TooLargePayload {
                size: 1 << 30,
                max: 16 * 1024 * 1024
            })
        );
        assert_eq!(pool.largest.load(Ordering::SeqCst), config.read_buffer_size);
    }

    #[test]
    fn test_message_limit_caps_uncapped_frames() {
        let pool = Arc::new(RecordingPool::default());
        let config = Config::default().with_limits(Limits::new(0, 64 * 1024 * 1024, 128));
        let wire = Cursor::new(bare_header(1 << 30));
        let mut reader = MessageReader::new(wire, pool.clone(), Role::Client, &config);

        assert_eq!(
            reader.read_message(),
            Err(Error::MessageTooLarge {
                size: 1 << 30,
                max: 64 * 1024 * 1024
            })
        );
        assert_eq!(pool.largest.load(Ordering::SeqCst), config.read_buffer_size);
    }

    #[test]
    fn test_server_rejects_unmasked_frames() {
        let wire = write_all(Role::Server, &Config::new(), &[Message::text("a")]);

        let result = reader(wire, Role::Server, &Config::new()).read_message();
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_client_rejects_masked_frames() {
        let wire = write_all(Role::Client, &Config::new(), &[Message::ping(b"p".to_vec())]);

        let mut client = reader(wire.clone(), Role::Client, &Config::new());
        assert!(matches!(client.read_message(), Err(Error::ProtocolViolation(_))));

        let mut server = reader(wire, Role::Server, &Config::new());
        assert_eq!(server.read_message().unwrap(), Message::ping(b"p".to_vec()));
        assert_eq!(server.role(), Role::Server);
    }

    #[test]
    fn test_writer_rejects_large_control_and_continuation() {
        let mut writer =
            MessageWriter::new(Vec::new(), SizeClassPool::shared(), Role::Server, &Config::new());

        assert_eq!(
            writer.write_message(OpCode::Ping, &[0u8; 126]),
            Err(Error::ControlFrameTooLarge(126))
        );
        assert!(matches!(
            writer.write_message(OpCode::Continuation, b"x"),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_server_frames_unmasked_client_frames_masked() {
        let config = Config::new();
        let server = write_all(Role::Server, &config, &[Message::text("a")]);
        let client = write_all(Role::Client, &config, &[Message::text("a")]);

        assert_eq!(server, vec![0x81, 0x01, b'a']);
        assert_eq!(client[1] & 0x80, 0x80);
        assert_eq!(client.len(), 2 + 4 + 1);
    }

    #[test]
    fn test_write_after_close() {
        let mut writer =
            MessageWriter::new(Vec::new(), SizeClassPool::shared(), Role::Server, &Config::new());
        writer.close().unwrap();

        assert_eq!(writer.send(&Message::text("late")), Err(Error::WriteClosed));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_compressed_roundtrip_with_takeover() {
        use crate::extensions::PermessageDeflateConfig;

        let config = Config::new().with_fragment_size(8);
        let deflate = PermessageDeflateConfig::enabled();
        let (_, mut client) = split_with_deflate(
            Cursor::new(Vec::new()),
            Vec::new(),
            SizeClassPool::shared(),
            Role::Client,
            &config,
            &deflate,
        );

        let messages = [
            Message::text("hello hello hello hello"),
            Message::ping(b"mid".to_vec()),
            Message::text("hello hello hello hello"),
        ];
        for msg in &messages {
            client.send(msg).unwrap();
        }
        let wire = client.into_inner();
        // first frame of a compressed message carries rsv1
        assert_eq!(wire[0] & 0x40, 0x40);

        let (mut server, _) = split_with_deflate(
            Cursor::new(wire),
            Vec::new(),
            SizeClassPool::shared(),
            Role::Server,
            &config,
            &deflate,
        );
        for expected in &messages {
            assert_eq!(&server.read_message().unwrap(), expected);
        }
    }
}
