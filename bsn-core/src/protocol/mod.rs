mod error;
mod frame;
mod message;

pub use error::{ParseResult, ProtocolError};
pub use frame::Frame;
pub use message::{Message, MsgType, MsgValue};

/// Size of an encoded [`Message`] on the wire.
pub const MESSAGE_SIZE: usize = 4;

/// Active-message type tag for BSN traffic.
pub const AM_BSN_MSG: u8 = 0x89;

pub const FRAME_PREAMBLE: u16 = 0xB5A7;
pub const PREAMBLE_SIZE: usize = 2;
pub const FRAME_HEADER_SIZE: usize = 6;
pub const FRAME_SIZE: usize = PREAMBLE_SIZE + FRAME_HEADER_SIZE + MESSAGE_SIZE;

/// Destination address meaning "every node in range".
pub const BROADCAST_ADDR: u16 = 0xFFFF;
