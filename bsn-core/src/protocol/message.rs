use super::{MESSAGE_SIZE, ParseResult, ProtocolError};
use crate::RoundId;

// message layout: msg_type(1) + msg_id(2, big-endian) + value(1)

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Req = 1,
    Res = 2,
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsgType::Req),
            2 => Ok(MsgType::Res),
            _ => Err(ProtocolError::InvalidMsgType(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgValue {
    Start = 0,
    NoMovement = 1,
    Movement = 2,
    Crisis = 3,
}

impl TryFrom<u8> for MsgValue {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MsgValue::Start),
            1 => Ok(MsgValue::NoMovement),
            2 => Ok(MsgValue::Movement),
            3 => Ok(MsgValue::Crisis),
            _ => Err(ProtocolError::InvalidMsgValue(value)),
        }
    }
}

/// One REQ or RES exchanged between the coordinator and a peripheral.
///
/// `msg_id` is carried in network byte order (big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub msg_type: MsgType,
    pub msg_id: RoundId,
    pub value: MsgValue,
}

impl Message {
    /// A coordinator poll opening round `msg_id`.
    pub fn request(msg_id: RoundId) -> Self {
        Self {
            msg_type: MsgType::Req,
            msg_id,
            value: MsgValue::Start,
        }
    }

    pub fn response(msg_id: RoundId, value: MsgValue) -> Self {
        Self {
            msg_type: MsgType::Res,
            msg_id,
            value,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < MESSAGE_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: MESSAGE_SIZE,
                available: bytes.len(),
            });
        }

        if bytes.len() > MESSAGE_SIZE {
            return Err(ProtocolError::TrailingData {
                expected: MESSAGE_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            msg_type: MsgType::try_from(bytes[0])?,
            msg_id: u16::from_be_bytes([bytes[1], bytes[2]]),
            value: MsgValue::try_from(bytes[3])?,
        })
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_SIZE] {
        let id_be = self.msg_id.to_be_bytes();
        [self.msg_type as u8, id_be[0], id_be[1], self.value as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fields_in_declared_order() {
        let msg = Message::response(0x0102, MsgValue::Crisis);
        assert_eq!(msg.to_bytes(), [2, 0x01, 0x02, 3]);

        let req = Message::request(7);
        assert_eq!(req.to_bytes(), [1, 0, 7, 0]);
    }

    #[test]
    fn decodes_big_endian_id() {
        let msg = Message::from_bytes(&[2, 0xFF, 0xFE, 1]).unwrap();
        assert_eq!(msg.msg_type, MsgType::Res);
        assert_eq!(msg.msg_id, 0xFFFE);
        assert_eq!(msg.value, MsgValue::NoMovement);
    }

    #[test]
    fn rejects_unknown_type_and_value() {
        assert_eq!(
            Message::from_bytes(&[0, 0, 1, 1]),
            Err(ProtocolError::InvalidMsgType(0))
        );
        assert_eq!(
            Message::from_bytes(&[3, 0, 1, 1]),
            Err(ProtocolError::InvalidMsgType(3))
        );
        assert_eq!(
            Message::from_bytes(&[1, 0, 1, 4]),
            Err(ProtocolError::InvalidMsgValue(4))
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            Message::from_bytes(&[1, 0, 1]),
            Err(ProtocolError::InsufficientData {
                needed: 4,
                available: 3
            })
        );
        assert_eq!(
            Message::from_bytes(&[1, 0, 1, 0, 0]),
            Err(ProtocolError::TrailingData {
                expected: 4,
                actual: 5
            })
        );
    }
}
