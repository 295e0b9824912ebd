//! Transport seam between a connection and the wire.
//!
//! A connection only sees a [`FrameSource`] (read half) and a [`FrameSink`]
//! (write half). [`websocket::split`] adapts an Axum socket. The in-process
//! `memory` pair is built for tests and behind the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod websocket;

use bytes::Bytes;
use futures::{Sink, Stream};

/// One frame pulled off the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingFrame {
    /// A text or binary payload, passed through untouched.
    Data(Bytes),
    /// The peer asked to close, with an optional reason.
    Close(Option<String>),
    /// Ping/pong; carries nothing the coordinator needs.
    Control,
}

/// Transport read or write failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Error reported by the WebSocket layer.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    /// The transport was already closed.
    #[error("transport closed")]
    Closed,
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Read half of a transport.
pub trait FrameSource:
    Stream<Item = Result<IncomingFrame, TransportError>> + Send + Unpin + 'static
{
}

impl<T> FrameSource for T where
    T: Stream<Item = Result<IncomingFrame, TransportError>> + Send + Unpin + 'static
{
}

/// Write half of a transport. Each item is one encoded text frame.
pub trait FrameSink: Sink<String, Error = TransportError> + Send + Unpin + 'static {}

impl<T> FrameSink for T where T: Sink<String, Error = TransportError> + Send + Unpin + 'static {}
