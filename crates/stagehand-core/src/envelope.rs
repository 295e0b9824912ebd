//! The command envelope that opens every request cycle.
//!
//! The backend starts a request with a single JSON text frame:
//!
//! ```json
//! {"command":"new","request_id":"r1","target":"cpp"}
//! ```
//!
//! Decoding problems ([`EnvelopeError`]) are per-message and silently
//! dropped by the coordinator. Validation problems ([`RequestRejection`])
//! are reported back to the backend as an `Error` + `Finish` pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stages::ResolveError;
use crate::text::{SENT_LOG_CHARS, excerpt};

/// The only command that starts a request cycle.
pub const NEW_REQUEST_COMMAND: &str = "new";

/// Stage name used for errors raised before delegation.
pub const INIT_STAGE: &str = "init";

/// First message of a request cycle.
///
/// Missing string fields decode as empty strings so that validation, not
/// decoding, decides how to answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    /// Command verb; only [`NEW_REQUEST_COMMAND`] is accepted.
    #[serde(default)]
    pub command: String,
    /// Backend-assigned request identifier.
    #[serde(default)]
    pub request_id: String,
    /// Target naming the processing plan.
    #[serde(default)]
    pub target: String,
    /// Must be absent (or `null`) on the first message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_files: Option<Value>,
}

/// A frame that cannot open a request cycle at all.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The payload is not a JSON object of the expected shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Decoded fine, but the command is not `new`.
    #[error("unexpected command '{command}'")]
    UnexpectedCommand {
        /// The command that was received.
        command: String,
    },
}

/// Why a `new` request was refused. `Display` is the `desc` sent to the backend.
#[derive(Debug, thiserror::Error)]
pub enum RequestRejection {
    /// `request_id` missing or empty.
    #[error("empty 'request_id' in the first message: {message}...")]
    EmptyRequestId {
        /// Start of the offending frame.
        message: String,
    },
    /// `target` missing or empty.
    #[error("empty 'target' in the first message: {message}...")]
    EmptyTarget {
        /// Start of the offending frame.
        message: String,
    },
    /// `source_files` must not be sent with the first message.
    #[error("unexpected 'source_files' content in the first message")]
    UnexpectedSourceFiles,
    /// The rule lookup rejected the target.
    #[error("failed to resolve stages for target '{target}': {source}")]
    Unresolved {
        /// The requested target.
        target: String,
        /// The lookup failure.
        source: ResolveError,
    },
}

impl ClientEnvelope {
    /// Decode a raw frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Decode a payload and require the `new` command.
    pub fn decode_request_start(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope = Self::decode(payload)?;
        if envelope.command != NEW_REQUEST_COMMAND {
            return Err(EnvelopeError::UnexpectedCommand {
                command: envelope.command,
            });
        }
        Ok(envelope)
    }

    /// Check the envelope fields in order, stopping at the first violation.
    ///
    /// `raw` is the frame the envelope was decoded from; empty-field
    /// rejections quote its start so the backend can match them up.
    pub fn validate(&self, raw: &[u8]) -> Result<(), RequestRejection> {
        if self.request_id.is_empty() {
            return Err(RequestRejection::EmptyRequestId {
                message: excerpt(raw, SENT_LOG_CHARS),
            });
        }
        if self.target.is_empty() {
            return Err(RequestRejection::EmptyTarget {
                message: excerpt(raw, SENT_LOG_CHARS),
            });
        }
        if self.source_files.is_some() {
            return Err(RequestRejection::UnexpectedSourceFiles);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_full_envelope() {
        let env = ClientEnvelope::decode(br#"{"command":"new","request_id":"r1","target":"t1"}"#)
            .unwrap();
        assert_eq!(env.command, "new");
        assert_eq!(env.request_id, "r1");
        assert_eq!(env.target, "t1");
        assert!(env.source_files.is_none());
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let env = ClientEnvelope::decode(br#"{"command":"ping"}"#).unwrap();
        assert_eq!(env.request_id, "");
        assert_eq!(env.target, "");
    }

    #[test]
    fn null_source_files_treated_as_absent() {
        let env = ClientEnvelope::decode(
            br#"{"command":"new","request_id":"r1","target":"t1","source_files":null}"#,
        )
        .unwrap();
        assert!(env.source_files.is_none());
        assert!(env.validate(b"").is_ok());
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert_matches!(
            ClientEnvelope::decode(b"not json"),
            Err(EnvelopeError::Malformed(_))
        );
    }

    #[test]
    fn non_object_is_malformed() {
        assert_matches!(
            ClientEnvelope::decode(b"[1,2,3]"),
            Err(EnvelopeError::Malformed(_))
        );
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        assert_matches!(
            ClientEnvelope::decode(br#"{"command":"new","request_id":7}"#),
            Err(EnvelopeError::Malformed(_))
        );
    }

    #[test]
    fn request_start_requires_new_command() {
        let err = ClientEnvelope::decode_request_start(br#"{"command":"ping"}"#).unwrap_err();
        assert_matches!(err, EnvelopeError::UnexpectedCommand { ref command } if command == "ping");
        assert_eq!(err.to_string(), "unexpected command 'ping'");
    }

    #[test]
    fn request_start_missing_command() {
        assert_matches!(
            ClientEnvelope::decode_request_start(br#"{"request_id":"r1"}"#),
            Err(EnvelopeError::UnexpectedCommand { .. })
        );
    }

    #[test]
    fn validate_empty_request_id_first() {
        let env = ClientEnvelope {
            command: "new".into(),
            source_files: Some(serde_json::json!({"main.cpp": ""})),
            ..ClientEnvelope::default()
        };
        assert_matches!(env.validate(b"{}"), Err(RequestRejection::EmptyRequestId { .. }));
    }

    #[test]
    fn validate_empty_target_second() {
        let env = ClientEnvelope {
            command: "new".into(),
            request_id: "r1".into(),
            source_files: Some(serde_json::json!([])),
            ..ClientEnvelope::default()
        };
        assert_matches!(env.validate(b"{}"), Err(RequestRejection::EmptyTarget { .. }));
    }

    #[test]
    fn validate_source_files_last() {
        let env = ClientEnvelope {
            command: "new".into(),
            request_id: "r1".into(),
            target: "t1".into(),
            source_files: Some(serde_json::json!({})),
        };
        assert_matches!(env.validate(b"{}"), Err(RequestRejection::UnexpectedSourceFiles));
    }

    #[test]
    fn empty_field_rejections_quote_the_frame() {
        let raw = br#"{"command":"new","request_id":"","target":"cpp"}"#;
        let rejection = ClientEnvelope::decode(raw).unwrap().validate(raw).unwrap_err();
        assert_eq!(
            rejection.to_string(),
            r#"empty 'request_id' in the first message: {"command":"new","request_id":"","target":"cpp"}..."#
        );

        let long = format!(
            r#"{{"command":"new","request_id":"r1","target":"","pad":"{}"}}"#,
            "x".repeat(200)
        );
        let rejection = ClientEnvelope::decode(long.as_bytes())
            .unwrap()
            .validate(long.as_bytes())
            .unwrap_err();
        assert_matches!(
            rejection,
            RequestRejection::EmptyTarget { message } if message == long[..SENT_LOG_CHARS]
        );
    }

    #[test]
    fn unresolved_rejection_display() {
        let rejection = RequestRejection::Unresolved {
            target: "cobol".into(),
            source: ResolveError::UnknownTarget {
                target: "cobol".into(),
            },
        };
        assert_eq!(
            rejection.to_string(),
            "failed to resolve stages for target 'cobol': unsupported target 'cobol'"
        );
    }
}
