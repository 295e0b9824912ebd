//! Sender task: outbound queue into transport writes.

use futures::SinkExt;
use metrics::counter;
use stagehand_core::events::OutgoingEvent;
use stagehand_core::text::{SENT_LOG_CHARS, truncate_for_log};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::queue::Outbound;
use crate::metrics::{ENCODE_FAILURES_TOTAL, WRITE_FAILURES_TOTAL};
use crate::transport::FrameSink;

/// Why the sender stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SenderStop {
    /// The close sentinel was dequeued.
    CloseRequested,
    /// A write failed.
    WriteFailed(String),
    /// Every producer handle was dropped without a sentinel.
    QueueReleased,
    /// The task panicked.
    Aborted,
}

/// What the sender hands back when it stops: the write half, so the
/// coordinator can close the transport.
pub(crate) struct SenderExit<K> {
    pub(crate) sink: K,
    pub(crate) stop: SenderStop,
}

/// Write queued events one at a time, flushing each, until the close
/// sentinel or a write failure.
pub(crate) async fn run_sender<K: FrameSink>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Outbound>,
) -> SenderExit<K> {
    let stop = loop {
        let event = match outbound.recv().await {
            Some(Outbound::Event(event)) => event,
            Some(Outbound::Close) => {
                debug!("close sentinel dequeued");
                break SenderStop::CloseRequested;
            }
            None => break SenderStop::QueueReleased,
        };

        if let OutgoingEvent::Error(body) = &event {
            error!(
                request_id = %body.request_id,
                stage = %body.stage,
                desc = %body.desc,
                "request failed"
            );
        }

        let text = match event.encode() {
            Ok(text) => text,
            Err(e) => {
                error!(kind = event.kind(), error = %e, "failed to encode event, dropping it");
                counter!(ENCODE_FAILURES_TOTAL).increment(1);
                continue;
            }
        };

        debug!(
            kind = event.kind(),
            payload = truncate_for_log(&text, SENT_LOG_CHARS),
            "sending message"
        );

        if let Err(e) = sink.send(text).await {
            warn!(error = %e, "transport write failed");
            counter!(WRITE_FAILURES_TOTAL).increment(1);
            break SenderStop::WriteFailed(e.to_string());
        }
    };

    SenderExit { sink, stop }
}
