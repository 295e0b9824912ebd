//! Receiver task: transport reads into the inbound queue.

use bytes::Bytes;
use futures::StreamExt;
use stagehand_core::text::{RECEIVED_LOG_CHARS, excerpt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{FrameSource, IncomingFrame};

/// Why the receiver stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiverExit {
    /// Close frame or end of stream.
    PeerClosed,
    /// A read failed.
    TransportError(String),
    /// The coordinator released the inbound queue.
    QueueReleased,
    /// The coordinator cancelled the read loop.
    Cancelled,
    /// The task panicked or was aborted after the drain timeout.
    Aborted,
}

/// Read frames until the peer closes, a read fails, or the coordinator
/// stops us. A full inbound queue blocks before the next read.
pub(crate) async fn run_receiver<S: FrameSource>(
    mut source: S,
    inbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> ReceiverExit {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("receiver cancelled");
                return ReceiverExit::Cancelled;
            }
            frame = source.next() => frame,
        };

        let payload = match frame {
            None => {
                info!("transport stream ended");
                return ReceiverExit::PeerClosed;
            }
            Some(Ok(IncomingFrame::Close(reason))) => {
                info!(?reason, "peer closed the connection");
                return ReceiverExit::PeerClosed;
            }
            Some(Ok(IncomingFrame::Control)) => continue,
            Some(Ok(IncomingFrame::Data(payload))) => payload,
            Some(Err(e)) => {
                warn!(error = %e, "transport read failed");
                return ReceiverExit::TransportError(e.to_string());
            }
        };

        debug!(
            len = payload.len(),
            payload = %excerpt(&payload, RECEIVED_LOG_CHARS),
            "received message"
        );

        let delivered = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("receiver cancelled while queue was full");
                return ReceiverExit::Cancelled;
            }
            res = inbound.send(payload) => res.is_ok(),
        };
        if !delivered {
            debug!("inbound queue released");
            return ReceiverExit::QueueReleased;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use stagehand_core::logging::capture_logs;
    use std::time::Duration;
    use tracing::Level;

    #[tokio::test]
    async fn forwards_payloads_in_order() {
        let (source, _sink, peer) = memory::pair(8);
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(run_receiver(source, tx, CancellationToken::new()));

        assert!(peer.send_text("first").await);
        assert!(peer.send_ping().await);
        assert!(peer.send_text("second").await);
        assert!(peer.send_close().await);

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"first"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"second"));
        assert_eq!(task.await.unwrap(), ReceiverExit::PeerClosed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn end_of_stream_is_peer_close() {
        let (source, _sink, mut peer) = memory::pair(1);
        let (tx, _rx) = mpsc::channel(1);
        peer.hang_up();
        assert_eq!(
            run_receiver(source, tx, CancellationToken::new()).await,
            ReceiverExit::PeerClosed
        );
    }

    #[tokio::test]
    async fn read_error_stops_with_reason() {
        let (source, _sink, peer) = memory::pair(1);
        let (tx, _rx) = mpsc::channel(1);
        let task = tokio::spawn(run_receiver(source, tx, CancellationToken::new()));
        assert!(peer.fail_read("connection reset").await);
        assert_eq!(
            task.await.unwrap(),
            ReceiverExit::TransportError("connection reset".into())
        );
    }

    #[tokio::test]
    async fn no_reads_after_close() {
        let (source, _sink, peer) = memory::pair(4);
        let (tx, mut rx) = mpsc::channel(4);
        assert!(peer.send_close().await);
        assert!(peer.send_text("after close").await);
        assert_eq!(
            run_receiver(source, tx, CancellationToken::new()).await,
            ReceiverExit::PeerClosed
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_idle_receiver() {
        let (source, _sink, _peer) = memory::pair(1);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_receiver(source, tx, cancel.clone()));
        cancel.cancel();
        assert_eq!(task.await.unwrap(), ReceiverExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_next_read() {
        let (source, _sink, peer) = memory::pair(1);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_receiver(source, tx, cancel.clone()));

        // One in the queue, one held by the blocked receiver, one buffered.
        assert!(peer.send_text("1").await);
        assert!(peer.send_text("2").await);
        assert!(peer.send_text("3").await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!peer.try_send_text("4"));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), ReceiverExit::Cancelled);
    }

    #[tokio::test]
    async fn released_queue_stops_receiver() {
        let (source, _sink, peer) = memory::pair(1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let task = tokio::spawn(run_receiver(source, tx, CancellationToken::new()));
        assert!(peer.send_text("orphan").await);
        assert_eq!(task.await.unwrap(), ReceiverExit::QueueReleased);
    }

    #[tokio::test]
    async fn long_payload_logged_truncated() {
        let (logs, _guard) = capture_logs();
        let (source, _sink, peer) = memory::pair(2);
        let (tx, _rx) = mpsc::channel(2);
        let long = "x".repeat(500);
        assert!(peer.send_text(long).await);
        assert!(peer.send_close().await);
        let _ = run_receiver(source, tx, CancellationToken::new()).await;

        let received: Vec<_> = logs
            .at_level(Level::DEBUG)
            .into_iter()
            .filter(|e| e.message == "received message")
            .collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].field("len"), Some("500"));
        assert_eq!(
            received[0].field("payload"),
            Some("x".repeat(RECEIVED_LOG_CHARS).as_str())
        );
        assert!(logs.has_event(Level::INFO, "peer closed"));
    }
}
