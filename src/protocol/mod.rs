//! RFC 6455 frame codec: headers, masking, frame I/O and message framing.

pub mod assembler;
pub mod fragmenter;
pub mod frame;
pub mod header;
pub mod mask;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use assembler::{AssembledMessage, MessageAssembler};
pub use fragmenter::{Fragment, MessageFragmenter};
pub use frame::Frame;
pub use header::{
    FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_HEADER_SIZE, decode_header, encode_header,
    header_len, read_header,
};
pub use mask::{apply_mask, apply_mask_bytewise};
pub use opcode::OpCode;
pub use reader::FrameReader;
pub use writer::{FrameWriter, write_frame_to_vec};
