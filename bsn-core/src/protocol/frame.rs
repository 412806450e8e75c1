use super::{
    AM_BSN_MSG, BROADCAST_ADDR, FRAME_HEADER_SIZE, FRAME_PREAMBLE, FRAME_SIZE, MESSAGE_SIZE,
    PREAMBLE_SIZE, ParseResult, ProtocolError,
};
use crate::{Destination, Message, NodeId};

// frame structure : preamble(2) + header(6) + message(4)
// header : am_type(1) + source(2) + destination(2) + payload_len(1)

/// Radio envelope around a [`Message`], carrying the addressing the
/// message itself does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub source: NodeId,
    pub destination: Destination,
    pub message: Message,
}

impl Frame {
    pub fn new(source: NodeId, destination: Destination, message: Message) -> Self {
        Self {
            source,
            destination,
            message,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < PREAMBLE_SIZE + FRAME_HEADER_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: PREAMBLE_SIZE + FRAME_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let preamble = u16::from_be_bytes([bytes[0], bytes[1]]);
        if preamble != FRAME_PREAMBLE {
            return Err(ProtocolError::InvalidPreamble(preamble));
        }

        let header = &bytes[PREAMBLE_SIZE..PREAMBLE_SIZE + FRAME_HEADER_SIZE];
        if header[0] != AM_BSN_MSG {
            return Err(ProtocolError::InvalidAmType(header[0]));
        }

        let source = NodeId(u16::from_be_bytes([header[1], header[2]]));
        let destination = match u16::from_be_bytes([header[3], header[4]]) {
            BROADCAST_ADDR => Destination::Broadcast,
            addr => Destination::Node(NodeId(addr)),
        };

        let payload_len = header[5];
        if payload_len as usize != MESSAGE_SIZE {
            return Err(ProtocolError::InvalidPayloadLength(payload_len));
        }

        let message = Message::from_bytes(&bytes[PREAMBLE_SIZE + FRAME_HEADER_SIZE..])?;

        Ok(Self {
            source,
            destination,
            message,
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];

        bytes[0..2].copy_from_slice(&FRAME_PREAMBLE.to_be_bytes());
        bytes[2] = AM_BSN_MSG;
        bytes[3..5].copy_from_slice(&self.source.0.to_be_bytes());

        let dest = match self.destination {
            Destination::Broadcast => BROADCAST_ADDR,
            Destination::Node(id) => id.0,
        };
        bytes[5..7].copy_from_slice(&dest.to_be_bytes());
        bytes[7] = MESSAGE_SIZE as u8;
        bytes[PREAMBLE_SIZE + FRAME_HEADER_SIZE..].copy_from_slice(&self.message.to_bytes());

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MsgValue;

    #[test]
    fn layout_matches_header_table() {
        let frame = Frame::new(
            NodeId(3),
            Destination::Node(NodeId(0)),
            Message::response(9, MsgValue::Movement),
        );

        assert_eq!(
            frame.to_bytes(),
            [0xB5, 0xA7, 0x89, 0x00, 0x03, 0x00, 0x00, 0x04, 0x02, 0x00, 0x09, 0x02]
        );
    }

    #[test]
    fn broadcast_address_decodes_to_broadcast() {
        let frame = Frame::new(NodeId(0), Destination::Broadcast, Message::request(1));
        let decoded = Frame::from_bytes(&frame.to_bytes()).unwrap();

        assert_eq!(decoded.destination, Destination::Broadcast);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_foreign_traffic() {
        let mut bytes = Frame::new(NodeId(1), Destination::Broadcast, Message::request(1)).to_bytes();
        bytes[2] = 0x06;
        assert_eq!(
            Frame::from_bytes(&bytes),
            Err(ProtocolError::InvalidAmType(0x06))
        );

        bytes[0] = 0xE4;
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(ProtocolError::InvalidPreamble(_))
        ));
    }

    #[test]
    fn rejects_truncated_and_bad_payload() {
        let bytes = Frame::new(NodeId(1), Destination::Broadcast, Message::request(1)).to_bytes();

        assert!(matches!(
            Frame::from_bytes(&bytes[..5]),
            Err(ProtocolError::InsufficientData { needed: 8, .. })
        ));
        assert!(matches!(
            Frame::from_bytes(&bytes[..10]),
            Err(ProtocolError::InsufficientData { needed: 4, .. })
        ));

        let mut bad_len = bytes;
        bad_len[7] = 6;
        assert_eq!(
            Frame::from_bytes(&bad_len),
            Err(ProtocolError::InvalidPayloadLength(6))
        );

        let mut bad_value = bytes;
        bad_value[11] = 9;
        assert_eq!(
            Frame::from_bytes(&bad_value),
            Err(ProtocolError::InvalidMsgValue(9))
        );
    }
}
