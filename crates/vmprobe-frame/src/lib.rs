//! Binary framing for the VM debug protocol.
//!
//! Every frame on the wire is:
//! - A 4-byte little-endian payload length (payload size only)
//! - A 4-byte little-endian message type code
//! - The payload bytes
//!
//! There is no magic header, checksum, or version field. A negative
//! length means the peer closed the socket or the stream
//! desynchronized; either way the connection is done.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
