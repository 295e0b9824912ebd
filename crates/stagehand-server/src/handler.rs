//! The request handler seam.

use async_trait::async_trait;
use serde::Serialize;
use stagehand_core::events::OutgoingEvent;
use stagehand_core::stages::StagePlan;
use tracing::debug;

use crate::connection::{InboundQueue, OutboundQueue};

/// A validated request, ready for its stages to run.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestStart {
    /// Backend-assigned request identifier (non-empty).
    pub request_id: String,
    /// The requested target (non-empty).
    pub target: String,
    /// Resolved stages, in order (non-empty).
    pub stages: StagePlan,
}

/// Runs a request once the coordinator has accepted it.
///
/// The handler borrows both queues for the duration of the call: it reads
/// any follow-up frames from `inbound` and writes its events to `outbound`.
/// By convention it finishes the cycle with a `Finish` event. The
/// connection does not read commands again until this returns, so a handler
/// that never returns stalls its connection.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Run one request.
    async fn run_request(
        &self,
        request: RequestStart,
        inbound: &mut InboundQueue,
        outbound: &OutboundQueue,
    );
}

/// Per-stage event written by [`DryRunHandler`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Request the stage belongs to.
    pub request_id: String,
    /// Stage name.
    pub stage: String,
    /// Always `"skipped"`.
    pub status: &'static str,
}

/// Reports the resolved plan without running anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRunHandler;

#[async_trait]
impl RequestHandler for DryRunHandler {
    async fn run_request(
        &self,
        request: RequestStart,
        _inbound: &mut InboundQueue,
        outbound: &OutboundQueue,
    ) {
        for stage in &request.stages {
            let report = StageReport {
                request_id: request.request_id.clone(),
                stage: stage.name.clone(),
                status: "skipped",
            };
            if outbound.send(OutgoingEvent::handler(report)).await.is_err() {
                debug!(request_id = %request.request_id, "outbound closed mid-plan");
                return;
            }
        }
        let _ = outbound
            .send(OutgoingEvent::finish(request.request_id))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::QueueClosed;

    #[test]
    fn stage_report_wire_shape() {
        let report = StageReport {
            request_id: "r1".into(),
            stage: "compile".into(),
            status: "skipped",
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"request_id": "r1", "stage": "compile", "status": "skipped"})
        );
    }

    #[test]
    fn request_start_equality() {
        let a = RequestStart {
            request_id: "r1".into(),
            target: "cpp".into(),
            stages: StagePlan::from_names(["compile"]),
        };
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn queue_closed_display() {
        assert_eq!(QueueClosed.to_string(), "queue closed");
    }
}
