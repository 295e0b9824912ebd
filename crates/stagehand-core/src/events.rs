//! Events written back to the backend.
//!
//! Wire shapes:
//!
//! - `Error`:  `{"desc":"...","stage":"init","request_id":"..."}`
//! - `Finish`: `{"finish":true,"request_id":"..."}`
//! - `Handler`: whatever the request handler's event serializes to

use std::fmt;

use serde::Serialize;

use crate::envelope::{INIT_STAGE, RequestRejection};

/// Body of an `Error` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    /// Human-readable description.
    pub desc: String,
    /// Stage during which the error happened.
    pub stage: String,
    /// Request the error belongs to (may be empty).
    pub request_id: String,
}

/// Body of a `Finish` event; closes a request cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FinishEvent {
    /// Always `true` on the wire.
    pub finish: bool,
    /// Request being finished (may be empty).
    pub request_id: String,
}

/// A handler-defined event that knows how to encode itself.
///
/// Implemented for every `Serialize + Debug` type, so handlers can enqueue
/// their own typed events without going through `serde_json::Value`.
pub trait HandlerEvent: fmt::Debug + Send + Sync {
    /// Encode into one JSON text frame.
    fn encode(&self) -> Result<String, serde_json::Error>;
}

impl<T> HandlerEvent for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One event destined for the backend.
#[derive(Debug)]
pub enum OutgoingEvent {
    /// A request-scoped error.
    Error(ErrorEvent),
    /// End of a request cycle.
    Finish(FinishEvent),
    /// Event produced by the request handler.
    Handler(Box<dyn HandlerEvent>),
}

impl OutgoingEvent {
    /// Build an `Error` event.
    pub fn error(
        desc: impl Into<String>,
        stage: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorEvent {
            desc: desc.into(),
            stage: stage.into(),
            request_id: request_id.into(),
        })
    }

    /// Build a `Finish` event.
    pub fn finish(request_id: impl Into<String>) -> Self {
        Self::Finish(FinishEvent {
            finish: true,
            request_id: request_id.into(),
        })
    }

    /// Wrap a handler-defined event.
    pub fn handler(event: impl HandlerEvent + 'static) -> Self {
        Self::Handler(Box::new(event))
    }

    /// The `Error` + `Finish` pair answering a refused request.
    pub fn rejection(request_id: &str, rejection: &RequestRejection) -> [Self; 2] {
        [
            Self::error(rejection.to_string(), INIT_STAGE, request_id),
            Self::finish(request_id),
        ]
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::Finish(_) => "finish",
            Self::Handler(_) => "handler",
        }
    }

    /// Encode into one JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Error(body) => serde_json::to_string(body),
            Self::Finish(body) => serde_json::to_string(body),
            Self::Handler(event) => event.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[derive(Debug)]
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to encode"))
        }
    }

    #[test]
    fn error_wire_shape() {
        let event = OutgoingEvent::error("boom", "init", "r1");
        assert_eq!(
            parse(&event.encode().unwrap()),
            json!({"desc": "boom", "stage": "init", "request_id": "r1"})
        );
    }

    #[test]
    fn finish_wire_shape() {
        let event = OutgoingEvent::finish("r1");
        assert_eq!(
            parse(&event.encode().unwrap()),
            json!({"finish": true, "request_id": "r1"})
        );
    }

    #[test]
    fn finish_with_empty_request_id() {
        let event = OutgoingEvent::finish("");
        assert_eq!(parse(&event.encode().unwrap())["request_id"], "");
    }

    #[test]
    fn handler_event_encodes_itself() {
        let event = OutgoingEvent::handler(json!({"stage": "run", "stdout": "hi"}));
        assert_eq!(
            parse(&event.encode().unwrap()),
            json!({"stage": "run", "stdout": "hi"})
        );
    }

    #[test]
    fn typed_handler_event() {
        #[derive(Debug, Serialize)]
        struct Progress {
            request_id: String,
            percent: u8,
        }
        let event = OutgoingEvent::handler(Progress {
            request_id: "r9".into(),
            percent: 50,
        });
        assert_eq!(
            parse(&event.encode().unwrap()),
            json!({"request_id": "r9", "percent": 50})
        );
    }

    #[test]
    fn handler_encode_failure_surfaces() {
        let event = OutgoingEvent::handler(Unencodable);
        assert!(event.encode().is_err());
    }

    #[test]
    fn rejection_pair_order() {
        let rejection = RequestRejection::EmptyTarget {
            message: r#"{"target":""}"#.into(),
        };
        let [first, second] = OutgoingEvent::rejection("r2", &rejection);
        assert_eq!(first.kind(), "error");
        assert_eq!(second.kind(), "finish");
        assert_eq!(
            parse(&first.encode().unwrap()),
            json!({
                "desc": r#"empty 'target' in the first message: {"target":""}..."#,
                "stage": "init",
                "request_id": "r2"
            })
        );
        assert_eq!(
            parse(&second.encode().unwrap()),
            json!({"finish": true, "request_id": "r2"})
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(OutgoingEvent::handler(json!(null)).kind(), "handler");
        assert_eq!(OutgoingEvent::finish("x").kind(), "finish");
        assert_eq!(OutgoingEvent::error("d", "s", "x").kind(), "error");
    }
}
