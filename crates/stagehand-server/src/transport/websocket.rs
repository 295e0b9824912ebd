//! Axum WebSocket adapter.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::future;
use futures::{SinkExt, StreamExt};

use super::{FrameSink, FrameSource, IncomingFrame, TransportError};

/// Split an upgraded socket into connection halves.
///
/// Outgoing frames are always sent as text.
pub fn split(socket: WebSocket) -> (impl FrameSource, impl FrameSink) {
    let (sink, stream) = socket.split();

    let source = stream.map(|msg| msg.map(IncomingFrame::from).map_err(TransportError::from));
    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

    (source, sink)
}

impl From<Message> for IncomingFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Data(Bytes::copy_from_slice(text.as_str().as_bytes())),
            Message::Binary(data) => Self::Data(data),
            Message::Close(frame) => Self::Close(frame.map(|f| f.reason.as_str().to_owned())),
            Message::Ping(_) | Message::Pong(_) => Self::Control,
        }
    }
}
