//! The two bounded queues that join a connection's tasks.
//!
//! Handlers only ever see [`InboundQueue`] (receive side) and
//! [`OutboundQueue`] (send side). Neither exposes a way to close the
//! underlying channel, and only this crate can enqueue the close sentinel.

use bytes::Bytes;
use stagehand_core::events::OutgoingEvent;
use tokio::sync::mpsc;

/// Item carried by the outbound queue.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// An event to encode and write.
    Event(OutgoingEvent),
    /// Stop the sender. Never written to the wire.
    Close,
}

/// The other end of a queue is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("queue closed")]
pub struct QueueClosed;

/// Raw frames read from the transport, oldest first.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<Bytes>,
}

impl InboundQueue {
    /// Next raw payload; `None` once the receiver has stopped and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Throw away every payload already queued and return how many there
    /// were. Does not wait for more.
    pub(crate) fn discard_pending(&mut self) -> u64 {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Number of payloads waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no payload is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Events waiting to be written, oldest first.
#[derive(Debug)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Outbound>,
}

impl OutboundQueue {
    /// Enqueue an event, waiting while the queue is full.
    pub async fn send(&self, event: OutgoingEvent) -> Result<(), QueueClosed> {
        self.tx
            .send(Outbound::Event(event))
            .await
            .map_err(|_| QueueClosed)
    }

    /// Enqueue the close sentinel.
    pub(crate) async fn send_close(&self) -> Result<(), QueueClosed> {
        self.tx.send(Outbound::Close).await.map_err(|_| QueueClosed)
    }

    /// Free slots right now.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the sender has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Build the inbound queue. Capacity is clamped to at least 1.
pub(crate) fn inbound(capacity: usize) -> (mpsc::Sender<Bytes>, InboundQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, InboundQueue { rx })
}

/// Build the outbound queue. Capacity is clamped to at least 1.
pub(crate) fn outbound(capacity: usize) -> (OutboundQueue, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundQueue { tx }, rx)
}
