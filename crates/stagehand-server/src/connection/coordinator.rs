//! Coordinator: dispatches request cycles and drives the ordered shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use metrics::counter;
use stagehand_core::envelope::{ClientEnvelope, EnvelopeError, RequestRejection};
use stagehand_core::events::OutgoingEvent;
use stagehand_core::stages::StageResolver;
use stagehand_core::text::{SENT_LOG_CHARS, excerpt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{InboundQueue, OutboundQueue};
use super::receiver::ReceiverExit;
use super::sender::{SenderExit, SenderStop};
use super::{ConnectionReport, ConnectionState};
use crate::handler::{RequestHandler, RequestStart};
use crate::metrics::{MESSAGES_DROPPED_TOTAL, REQUESTS_DELEGATED_TOTAL, REQUESTS_REJECTED_TOTAL};
use crate::transport::FrameSink;

/// What to do with one inbound payload while awaiting a command.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// Not a usable `new` envelope; log and move on.
    Drop(EnvelopeError),
    /// A `new` envelope that cannot run; answer with Error + Finish.
    Reject {
        request_id: String,
        rejection: RequestRejection,
    },
    /// Hand the request to the handler.
    Start(RequestStart),
}

/// Decode, validate and resolve one payload.
pub(crate) fn classify(payload: &[u8], resolver: &dyn StageResolver) -> Dispatch {
    let envelope = match ClientEnvelope::decode_request_start(payload) {
        Ok(envelope) => envelope,
        Err(e) => return Dispatch::Drop(e),
    };

    if let Err(rejection) = envelope.validate(payload) {
        return Dispatch::Reject {
            request_id: envelope.request_id,
            rejection,
        };
    }

    match resolver.resolve(&envelope.target) {
        Ok(stages) => Dispatch::Start(RequestStart {
            request_id: envelope.request_id,
            target: envelope.target,
            stages,
        }),
        Err(source) => Dispatch::Reject {
            request_id: envelope.request_id,
            rejection: RequestRejection::Unresolved {
                target: envelope.target,
                source,
            },
        },
    }
}

/// Why the dispatch loop ended.
enum Wake<K> {
    ReceiverDone(ReceiverExit),
    SenderDone(Option<SenderExit<K>>),
    Shutdown,
}

/// Join handles and token for the two I/O tasks.
pub(crate) struct Tasks<K> {
    pub(crate) receiver: JoinHandle<ReceiverExit>,
    pub(crate) sender: JoinHandle<SenderExit<K>>,
    pub(crate) receiver_cancel: CancellationToken,
}

pub(crate) struct Coordinator {
    pub(crate) resolver: Arc<dyn StageResolver>,
    pub(crate) handler: Arc<dyn RequestHandler>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) receiver_drain_timeout: Duration,
    pub(crate) report: ConnectionReport,
}

impl Coordinator {
    /// Run until a completion signal or shutdown, then tear down.
    pub(crate) async fn run<K: FrameSink>(
        mut self,
        mut inbound: InboundQueue,
        outbound: OutboundQueue,
        mut tasks: Tasks<K>,
    ) -> ConnectionReport {
        let wake = self.dispatch(&mut inbound, &outbound, &mut tasks).await;
        self.shut_down(wake, inbound, outbound, tasks).await
    }

    async fn dispatch<K: FrameSink>(
        &mut self,
        inbound: &mut InboundQueue,
        outbound: &OutboundQueue,
        tasks: &mut Tasks<K>,
    ) -> Wake<K> {
        loop {
            self.report.final_state = ConnectionState::AwaitingCommand;
            tokio::select! {
                biased;
                exit = &mut tasks.receiver => {
                    self.drain_inbound(inbound, outbound).await;
                    return Wake::ReceiverDone(exit.unwrap_or(ReceiverExit::Aborted));
                }
                exit = &mut tasks.sender => {
                    return Wake::SenderDone(exit.ok());
                }
                () = self.shutdown.cancelled() => {
                    return Wake::Shutdown;
                }
                payload = inbound.recv() => match payload {
                    Some(payload) => self.on_message(&payload, inbound, outbound).await,
                    // Receiver dropped its end; its task is about to complete.
                    None => {
                        let exit = (&mut tasks.receiver).await.unwrap_or(ReceiverExit::Aborted);
                        return Wake::ReceiverDone(exit);
                    }
                },
            }
        }
    }

    /// Handle frames the receiver queued before it stopped, in order. Its
    /// end of the queue is gone, so this ends once the queue is empty.
    async fn drain_inbound(&mut self, inbound: &mut InboundQueue, outbound: &OutboundQueue) {
        while let Some(payload) = inbound.recv().await {
            self.on_message(&payload, inbound, outbound).await;
        }
    }

    async fn on_message(
        &mut self,
        payload: &[u8],
        inbound: &mut InboundQueue,
        outbound: &OutboundQueue,
    ) {
        match classify(payload, self.resolver.as_ref()) {
            Dispatch::Drop(reason) => {
                self.report.messages_dropped += 1;
                counter!(MESSAGES_DROPPED_TOTAL).increment(1);
                warn!(
                    error = %reason,
                    payload = %excerpt(payload, SENT_LOG_CHARS),
                    "ignoring message outside a request cycle"
                );
            }
            Dispatch::Reject {
                request_id,
                rejection,
            } => {
                self.report.requests_rejected += 1;
                counter!(REQUESTS_REJECTED_TOTAL).increment(1);
                warn!(request_id = %request_id, reason = %rejection, "rejecting request");
                for event in OutgoingEvent::rejection(&request_id, &rejection) {
                    if outbound.send(event).await.is_err() {
                        debug!(request_id = %request_id, "sender gone, rejection not delivered");
                        break;
                    }
                }
            }
            Dispatch::Start(request) => {
                self.report.requests_delegated += 1;
                self.report.final_state = ConnectionState::Delegated;
                counter!(REQUESTS_DELEGATED_TOTAL).increment(1);
                info!(
                    request_id = %request.request_id,
                    target = %request.target,
                    stages = request.stages.len(),
                    "delegating request"
                );
                let request_id = request.request_id.clone();
                self.handler.run_request(request, inbound, outbound).await;
                debug!(request_id = %request_id, "handler returned");
            }
        }
    }

    async fn shut_down<K: FrameSink>(
        mut self,
        wake: Wake<K>,
        mut inbound: InboundQueue,
        outbound: OutboundQueue,
        tasks: Tasks<K>,
    ) -> ConnectionReport {
        self.report.final_state = ConnectionState::ShuttingDown;
        let Tasks {
            mut receiver,
            sender,
            receiver_cancel,
        } = tasks;

        let (receiver_exit, sender_exit) = match wake {
            Wake::ReceiverDone(exit) => {
                info!(reason = ?exit, "receiver stopped, shutting down");
                (Some(exit), None)
            }
            Wake::SenderDone(exit) => {
                info!("sender stopped, shutting down");
                (None, Some(exit))
            }
            Wake::Shutdown => {
                info!("server shutdown requested");
                (None, None)
            }
        };

        // Sentinel first, then wait for the sender to drain everything ahead of it.
        let sender_exit = match sender_exit {
            Some(exit) => exit,
            None => {
                if outbound.send_close().await.is_ok() {
                    self.report.close_sentinels += 1;
                }
                sender.await.ok()
            }
        };

        match sender_exit {
            Some(SenderExit { mut sink, stop }) => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "transport close failed");
                }
                self.report.sender_stop = stop;
            }
            None => {
                warn!("sender task aborted, transport left to drop");
                self.report.sender_stop = SenderStop::Aborted;
            }
        }

        let discarded = inbound.discard_pending();
        if discarded > 0 {
            self.report.messages_dropped += discarded;
            counter!(MESSAGES_DROPPED_TOTAL).increment(discarded);
            warn!(discarded, "dropping frames left unread at shutdown");
        }
        drop(outbound);
        drop(inbound);

        self.report.receiver_exit = match receiver_exit {
            Some(exit) => exit,
            None => {
                receiver_cancel.cancel();
                match tokio::time::timeout(self.receiver_drain_timeout, &mut receiver).await {
                    Ok(exit) => exit.unwrap_or(ReceiverExit::Aborted),
                    Err(_) => {
                        warn!(
                            timeout_ms = self.receiver_drain_timeout.as_millis(),
                            "receiver did not stop in time, aborting"
                        );
                        receiver.abort();
                        ReceiverExit::Aborted
                    }
                }
            }
        };

        self.report.final_state = ConnectionState::Closed;
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use stagehand_core::stages::{ResolveError, StagePlan};

    fn resolver(target: &str) -> Result<StagePlan, ResolveError> {
        match target {
            "t1" => Ok(StagePlan::from_names(["compile", "run"])),
            _ => Err(ResolveError::UnknownTarget {
                target: target.to_owned(),
            }),
        }
    }

    #[test]
    fn valid_envelope_starts_request() {
        let dispatch = classify(br#"{"command":"new","request_id":"r1","target":"t1"}"#, &resolver);
        assert_matches!(dispatch, Dispatch::Start(req) => {
            assert_eq!(req.request_id, "r1");
            assert_eq!(req.target, "t1");
            assert_eq!(req.stages.names(), vec!["compile", "run"]);
        });
    }

    #[test]
    fn bad_json_dropped() {
        assert_matches!(
            classify(b"{not json", &resolver),
            Dispatch::Drop(EnvelopeError::Malformed(_))
        );
    }

    #[test]
    fn other_command_dropped() {
        assert_matches!(
            classify(br#"{"command":"ping"}"#, &resolver),
            Dispatch::Drop(EnvelopeError::UnexpectedCommand { command }) if command == "ping"
        );
    }

    #[test]
    fn validation_order_short_circuits() {
        assert_matches!(
            classify(br#"{"command":"new","request_id":"","target":"","source_files":[]}"#, &resolver),
            Dispatch::Reject { request_id, rejection: RequestRejection::EmptyRequestId { .. } } if request_id.is_empty()
        );
        assert_matches!(
            classify(br#"{"command":"new","request_id":"r2","target":"","source_files":[]}"#, &resolver),
            Dispatch::Reject { rejection: RequestRejection::EmptyTarget { .. }, .. }
        );
        assert_matches!(
            classify(br#"{"command":"new","request_id":"r3","target":"t1","source_files":{"a.cpp":""}}"#, &resolver),
            Dispatch::Reject { rejection: RequestRejection::UnexpectedSourceFiles, .. }
        );
    }

    #[test]
    fn unknown_target_rejected_with_request_id() {
        assert_matches!(
            classify(br#"{"command":"new","request_id":"r4","target":"cobol"}"#, &resolver),
            Dispatch::Reject { request_id, rejection: RequestRejection::Unresolved { target, .. } }
                if request_id == "r4" && target == "cobol"
        );
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_start(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let dispatch = classify(&payload, &resolver);
            prop_assert!(!matches!(dispatch, Dispatch::Start(_)));
        }

        #[test]
        fn non_new_commands_always_dropped(
            command in "[a-z]{0,8}".prop_filter("not new", |c| c != "new"),
            request_id in "[a-z0-9]{0,8}",
        ) {
            let payload = serde_json::json!({
                "command": command,
                "request_id": request_id,
                "target": "t1",
            })
            .to_string();
            prop_assert!(
                matches!(classify(payload.as_bytes(), &resolver), Dispatch::Drop(_)),
                "expected drop"
            );
        }

        #[test]
        fn valid_requests_keep_their_id(request_id in "[A-Za-z0-9_-]{1,32}") {
            let payload = serde_json::json!({
                "command": "new",
                "request_id": request_id,
                "target": "t1",
            })
            .to_string();
            match classify(payload.as_bytes(), &resolver) {
                Dispatch::Start(req) => prop_assert_eq!(req.request_id, request_id),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
