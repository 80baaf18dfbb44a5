//! utb-protocol: Wire protocol for the utbot test-generation client
//!
//! This crate defines the binary framing used between the client and the
//! test-generation service. Many independent call streams are multiplexed
//! over a single TCP connection, each frame tagged with its stream id.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod stream;

pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{ErrorCode, Message, MessageType, RpcMethod, PROTOCOL_VERSION};
pub use stream::StreamId;
