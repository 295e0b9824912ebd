//! In-process transport.
//!
//! [`pair`] returns the two connection halves plus a [`MemoryPeer`] that
//! plays the backend: it injects frames, reads what the connection wrote,
//! and inspects the ordered log of sink operations.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Sink;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{IncomingFrame, TransportError};

/// Read half handed to the connection.
pub type MemorySource = ReceiverStream<Result<IncomingFrame, TransportError>>;

/// One operation observed on a [`MemorySink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkOp {
    /// A frame was written.
    Write(String),
    /// The sink was closed.
    Close,
}

#[derive(Default)]
struct SinkState {
    ops: Vec<SinkOp>,
    fail_writes: bool,
    closed: bool,
}

/// Write half handed to the connection.
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    written: Option<mpsc::UnboundedSender<String>>,
}

impl Sink<String> for MemorySink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.state.lock().closed {
            return Poll::Ready(Err(TransportError::Closed));
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.fail_writes {
                return Err(TransportError::Other("simulated write failure".into()));
            }
            state.ops.push(SinkOp::Write(item.clone()));
        }
        if let Some(tx) = &self.written {
            let _ = tx.send(item);
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        {
            let mut state = this.state.lock();
            state.ops.push(SinkOp::Close);
            state.closed = true;
        }
        // Ends the peer's `next_written` stream once drained.
        this.written = None;
        Poll::Ready(Ok(()))
    }
}

/// The far end of an in-memory transport.
pub struct MemoryPeer {
    incoming: Option<mpsc::Sender<Result<IncomingFrame, TransportError>>>,
    written: mpsc::UnboundedReceiver<String>,
    state: Arc<Mutex<SinkState>>,
}

/// Create a connected transport.
///
/// `read_capacity` bounds how many frames the peer can queue before the
/// connection reads them (minimum 1).
pub fn pair(read_capacity: usize) -> (MemorySource, MemorySink, MemoryPeer) {
    let (incoming_tx, incoming_rx) = mpsc::channel(read_capacity.max(1));
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(SinkState::default()));

    let source = ReceiverStream::new(incoming_rx);
    let sink = MemorySink {
        state: Arc::clone(&state),
        written: Some(written_tx),
    };
    let peer = MemoryPeer {
        incoming: Some(incoming_tx),
        written: written_rx,
        state,
    };
    (source, sink, peer)
}

impl MemoryPeer {
    async fn push(&self, item: Result<IncomingFrame, TransportError>) -> bool {
        match &self.incoming {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        }
    }

    /// Send a text frame; `false` once the connection stopped reading.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(IncomingFrame::Data(Bytes::from(text.into()))))
            .await
    }

    /// Send a text frame without waiting; `false` when the read buffer is full.
    pub fn try_send_text(&self, text: impl Into<String>) -> bool {
        self.incoming.as_ref().is_some_and(|tx| {
            tx.try_send(Ok(IncomingFrame::Data(Bytes::from(text.into()))))
                .is_ok()
        })
    }

    /// Send a ping.
    pub async fn send_ping(&self) -> bool {
        self.push(Ok(IncomingFrame::Control)).await
    }

    /// Send a close frame.
    pub async fn send_close(&self) -> bool {
        self.push(Ok(IncomingFrame::Close(None))).await
    }

    /// Deliver a read error to the connection.
    pub async fn fail_read(&self, reason: &str) -> bool {
        self.push(Err(TransportError::Other(reason.to_owned())))
            .await
    }

    /// Drop the read side; the connection sees end of stream.
    pub fn hang_up(&mut self) {
        self.incoming = None;
    }

    /// Make every later write fail.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Next frame written by the connection; `None` after the sink closed.
    pub async fn next_written(&mut self) -> Option<String> {
        self.written.recv().await
    }

    /// Next written frame parsed as JSON.
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        let text = self.next_written().await?;
        serde_json::from_str(&text).ok()
    }

    /// Every sink operation so far, in order.
    pub fn ops(&self) -> Vec<SinkOp> {
        self.state.lock().ops.clone()
    }

    /// How many times the sink was closed.
    pub fn close_count(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| **op == SinkOp::Close)
            .count()
    }
}
