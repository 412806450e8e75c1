use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bsn_core::{Destination, Frame, Message, NodeId, Transport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::node::NodeEvent;
use crate::state::NetworkState;

/// Shared single-hop radio medium.
///
/// Every transmission is encoded to its on-air frame and offered to each
/// attached node the destination includes, except the sender. Each
/// delivery is independently subject to the loss of its directed link
/// (the per-link override, or the network-wide default), and a receiver
/// whose queue is full misses the frame.
#[derive(Clone)]
pub struct Radio {
    inner: Arc<Inner>,
}

struct Inner {
    nodes: RwLock<BTreeMap<NodeId, mpsc::Sender<NodeEvent>>>,
    link_loss: f64,
    links: BTreeMap<(NodeId, NodeId), f64>,
    rng: Mutex<StdRng>,
    state: NetworkState,
}

impl Radio {
    pub fn new(link_loss: f64, seed: Option<u64>, state: NetworkState) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(BTreeMap::new()),
                link_loss: link_loss.clamp(0.0, 1.0),
                links: BTreeMap::new(),
                rng: Mutex::new(rng),
                state,
            }),
        }
    }

    /// Override the loss of individual directed links, keyed by
    /// `(from, to)`. Must be called before the radio is shared.
    pub fn with_links(mut self, links: BTreeMap<(NodeId, NodeId), f64>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.links = links
                .into_iter()
                .map(|(link, loss)| (link, loss.clamp(0.0, 1.0)))
                .collect();
        } else {
            warn!("Radio already shared, link overrides ignored");
        }
        self
    }

    /// Put a node on the air. Frames for it are pushed into `events`.
    pub fn attach(&self, node: NodeId, events: mpsc::Sender<NodeEvent>) {
        self.inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node, events);
    }

    /// Transport handle that transmits as `node`.
    pub fn transport(&self, node: NodeId) -> RadioTransport {
        RadioTransport {
            radio: self.clone(),
            node,
        }
    }

    pub fn transmit(&self, frame: Frame) {
        let bytes = frame.to_bytes();
        self.inner.state.frame_sent();
        trace!(source = %frame.source, destination = ?frame.destination, ?frame.message, "Frame on air");

        let receivers: Vec<(NodeId, mpsc::Sender<NodeEvent>)> = self
            .inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| **id != frame.source && frame.destination.includes(**id))
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        for (node, tx) in receivers {
            if self.lost(frame.source, node) {
                debug!(source = %frame.source, %node, "Frame lost");
                self.inner.state.frame_lost();
                continue;
            }

            match tx.try_send(NodeEvent::Frame(bytes.to_vec())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%node, "Receive queue full, frame dropped");
                    self.inner.state.frame_overflow();
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(%node, "Receiver gone");
                }
            }
        }
    }

    /// Push raw bytes into a node's receive queue, bypassing encoding and
    /// link loss.
    pub fn deliver_raw(&self, node: NodeId, bytes: Vec<u8>) -> bool {
        let tx = self
            .inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .cloned();

        match tx {
            Some(tx) => tx.try_send(NodeEvent::Frame(bytes)).is_ok(),
            None => false,
        }
    }

    fn lost(&self, from: NodeId, to: NodeId) -> bool {
        let loss = self
            .inner
            .links
            .get(&(from, to))
            .copied()
            .unwrap_or(self.inner.link_loss);
        if loss <= 0.0 {
            return false;
        }

        let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_bool(loss)
    }
}

/// A node's handle on the shared [`Radio`].
#[derive(Clone)]
pub struct RadioTransport {
    radio: Radio,
    node: NodeId,
}

impl Transport for RadioTransport {
    fn send(&mut self, destination: Destination, message: Message) {
        self.radio
            .transmit(Frame::new(self.node, destination, message));
    }
}
