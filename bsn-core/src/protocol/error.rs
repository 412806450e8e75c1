pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

/// Structural decode failures. Anything producing one of these is dropped
/// before it reaches a node's state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid frame preamble: {0:#06X}")]
    InvalidPreamble(u16),
    #[error("insufficient data: needed {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("unexpected trailing data: expected {expected} bytes, got {actual}")]
    TrailingData { expected: usize, actual: usize },
    #[error("unknown active-message type {0:#04X}")]
    InvalidAmType(u8),
    #[error("invalid payload length {0}")]
    InvalidPayloadLength(u8),
    #[error("unknown message type {0}")]
    InvalidMsgType(u8),
    #[error("unknown message value {0}")]
    InvalidMsgValue(u8),
}
