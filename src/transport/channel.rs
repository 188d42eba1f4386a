//! Channel-backed transport
//!
//! [`ChannelTransport`] is the broker-facing half of a connection: a bounded
//! mpsc sender plus a close flag. The socket task owns the matching
//! [`OutboundQueue`] and writes whatever it yields to the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use super::{ConnectionId, Frame, Transport, TransportError};

/// Shared close signal between a transport and its queue
#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

/// Transport that queues frames on a bounded channel
#[derive(Debug)]
pub struct ChannelTransport {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    close: Arc<CloseSignal>,
}

impl ChannelTransport {
    /// Create a transport and the queue that drains it
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let close = Arc::new(CloseSignal::default());

        let transport = Self {
            id,
            tx,
            close: Arc::clone(&close),
        };
        let queue = OutboundQueue { rx, close };

        (transport, queue)
    }
}

impl Transport for ChannelTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self) {
        if !self.close.closed.swap(true, Ordering::AcqRel) {
            self.close.notify.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.close.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

/// Next action for the socket task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write this frame to the peer
    Frame(Frame),
    /// Close the connection
    Close,
}

/// Receiving half of a [`ChannelTransport`]
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Frame>,
    close: Arc<CloseSignal>,
}

impl OutboundQueue {
    /// Wait for the next frame or a close request
    ///
    /// A close request wins over queued frames. Returns [`Outbound::Close`]
    /// once the transport has been dropped as well.
    pub async fn recv(&mut self) -> Outbound {
        if self.close_requested() {
            return Outbound::Close;
        }

        tokio::select! {
            biased;
            _ = self.close.notify.notified() => Outbound::Close,
            frame = self.rx.recv() => match frame {
                Some(frame) => Outbound::Frame(frame),
                None => Outbound::Close,
            },
        }
    }

    /// Take a queued frame without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Drain every frame currently queued
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the broker asked for this connection to be closed
    pub fn close_requested(&self) -> bool {
        self.close.closed.load(Ordering::Acquire)
    }
}
