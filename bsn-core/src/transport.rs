use crate::{Message, NodeId};

/// Where a message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Node(NodeId),
    Broadcast,
}

impl Destination {
    /// Whether a node with id `node` should accept traffic sent here.
    pub fn includes(&self, node: NodeId) -> bool {
        match self {
            Destination::Broadcast => true,
            Destination::Node(id) => *id == node,
        }
    }
}

/// Single-hop radio used by both node roles.
///
/// Sending is fire-and-forget: there is no acknowledgement below the
/// application-level RES. Received messages are fed back to the node as
/// events by whatever owns the radio.
pub trait Transport {
    fn send(&mut self, destination: Destination, message: Message);
}
