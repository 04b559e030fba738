//! # wswire - WebSocket wire codec
//!
//! `wswire` implements the byte-level half of a WebSocket endpoint: RFC 6455
//! frame encoding and decoding over blocking transports, and RFC 7692
//! permessage-deflate with context takeover.
//!
//! ## Features
//!
//! - **Borrowed frame payloads** read into a pooled sliding window
//! - **Size-class buffer pool** shared between readers and writers
//! - **permessage-deflate** negotiation and compression (`compression` feature)
//! - **Resource limits** on frame, message and decompressed sizes
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use wswire::{Config, Message, MessageReader, MessageWriter, Role, SizeClassPool};
//!
//! let pool = SizeClassPool::shared();
//! let config = Config::new();
//!
//! let mut writer = MessageWriter::new(Vec::new(), pool.clone(), Role::Client, &config);
//! writer.send(&Message::text("hello")).unwrap();
//!
//! let wire = Cursor::new(writer.into_inner());
//! let mut reader = MessageReader::new(wire, pool, Role::Server, &config);
//! assert_eq!(reader.read_message().unwrap(), Message::text("hello"));
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod extensions;
pub mod message;
pub mod pool;
pub mod protocol;
pub mod role;

#[cfg(feature = "compression")]
pub mod compression;

pub use buffer::WindowBuffer;
pub use config::{Config, Limits};
pub use error::{Error, Result};
pub use extensions::{PermessageDeflateConfig, negotiate};
pub use message::{Message, MessageReader, MessageWriter};
pub use pool::{BufferPool, PooledBuf, SizeClassPool};
pub use protocol::{Frame, FrameHeader, FrameReader, FrameWriter, OpCode, apply_mask};
pub use role::Role;

#[cfg(feature = "compression")]
pub use compression::{Compressor, Decompressor, DeflateContext, HistoryDict};
#[cfg(feature = "compression")]
pub use message::split_with_deflate;
