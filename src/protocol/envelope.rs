//! Control-message envelopes and inbound classification.
//!
//! Three control envelopes share the stream with free-form data messages,
//! distinguished by a top-level `type` discriminator:
//!
//! | `type`                   | Direction | Maps to                        |
//! |--------------------------|-----------|--------------------------------|
//! | `control_request`        | both      | [`InboundMessage::Request`]    |
//! | `control_response`       | both      | [`InboundMessage::Response`]   |
//! | `control_cancel_request` | both      | [`InboundMessage::Cancel`]     |
//! | *(anything else)*        | inbound   | [`InboundMessage::Data`]       |
//!
//! Messages lacking a recognized `type` are data and pass through unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::Result;

/// A structured request, locally minted or peer-initiated.
///
/// Immutable once built; `payload` holds every `request` field other than
/// the subtype.
#[derive(Debug, Clone)]
pub struct ControlRequest {
    /// Correlation identifier, unique for the engine's lifetime.
    pub request_id: String,
    /// Request kind used for handler dispatch.
    pub subtype: String,
    /// Subtype-specific fields.
    pub payload: Map<String, Value>,
}

impl ControlRequest {
    /// Build a request envelope.
    #[must_use]
    pub fn new(request_id: String, subtype: String, payload: Map<String, Value>) -> Self {
        Self {
            request_id,
            subtype,
            payload,
        }
    }

    /// Serialize to the wire envelope.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut request = Map::new();
        request.insert("subtype".into(), Value::String(self.subtype.clone()));
        request.extend(self.payload.clone());
        json!({
            "type": "control_request",
            "request_id": self.request_id,
            "request": Value::Object(request),
        })
    }
}

/// Body of a control response, keyed by its `subtype` discriminator.
///
/// Exactly one is produced per control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ResponseBody {
    /// The request succeeded; `response` carries the result payload.
    Success {
        /// Correlation identifier of the originating request.
        request_id: String,
        /// Result payload, absent for bare acknowledgments.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<Map<String, Value>>,
    },
    /// The request failed; `error` carries the message verbatim.
    Error {
        /// Correlation identifier of the originating request.
        request_id: String,
        /// Failure description.
        error: String,
    },
    /// Acknowledgment of a cancellation notice.
    CancelAcknowledgment {
        /// Correlation identifier of the cancelled request.
        request_id: String,
        /// Whether the operation was known at lookup time.
        found: bool,
        /// Whether the operation had already completed at lookup time.
        already_completed: bool,
    },
}

impl ResponseBody {
    /// Correlation identifier this response answers.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Success { request_id, .. }
            | Self::Error { request_id, .. }
            | Self::CancelAcknowledgment { request_id, .. } => request_id,
        }
    }

    /// Serialize to the wire envelope.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let body = match self {
            Self::Success {
                request_id,
                response,
            } => {
                let mut body = Map::new();
                body.insert("subtype".into(), "success".into());
                body.insert("request_id".into(), request_id.clone().into());
                if let Some(payload) = response {
                    body.insert("response".into(), Value::Object(payload.clone()));
                }
                body
            }
            Self::Error { request_id, error } => {
                let mut body = Map::new();
                body.insert("subtype".into(), "error".into());
                body.insert("request_id".into(), request_id.clone().into());
                body.insert("error".into(), error.clone().into());
                body
            }
            Self::CancelAcknowledgment {
                request_id,
                found,
                already_completed,
            } => {
                let mut body = Map::new();
                body.insert("subtype".into(), "cancel_acknowledgment".into());
                body.insert("request_id".into(), request_id.clone().into());
                body.insert("found".into(), (*found).into());
                body.insert("already_completed".into(), (*already_completed).into());
                body
            }
        };
        json!({
            "type": "control_response",
            "response": Value::Object(body),
        })
    }
}

/// A request by one side to cancel the other side's in-flight handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelNotice {
    /// Correlation identifier of the request to cancel.
    pub request_id: String,
}

impl CancelNotice {
    /// Serialize to the wire envelope.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "control_cancel_request",
            "request_id": self.request_id,
        })
    }
}

/// One decoded inbound message, classified by its `type` discriminator.
#[derive(Debug)]
pub enum InboundMessage {
    /// A response correlating to a locally pending request.
    Response(ResponseBody),
    /// A peer-initiated request to dispatch to a handler.
    Request(ControlRequest),
    /// A peer cancellation notice for an in-flight operation.
    Cancel(CancelNotice),
    /// Anything else; forwarded to consumers unchanged.
    Data(Value),
}

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    request_id: String,
    request: RequestBody,
}

#[derive(Debug, Deserialize)]
struct RequestBody {
    subtype: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    response: ResponseBody,
}

/// Classify one decoded inbound message.
///
/// Messages without a recognized `type` string are returned as
/// [`InboundMessage::Data`] unchanged.
///
/// # Errors
///
/// Returns [`AppError::Protocol`](crate::AppError::Protocol) if a control
/// envelope is missing a required field (e.g. no `request_id`).
pub fn classify(value: Value) -> Result<InboundMessage> {
    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Ok(InboundMessage::Data(value));
    };

    match kind.as_str() {
        "control_response" => {
            let envelope: ResponseEnvelope = serde_json::from_value(value)?;
            Ok(InboundMessage::Response(envelope.response))
        }
        "control_request" => {
            let envelope: RequestEnvelope = serde_json::from_value(value)?;
            Ok(InboundMessage::Request(ControlRequest {
                request_id: envelope.request_id,
                subtype: envelope.request.subtype,
                payload: envelope.request.payload,
            }))
        }
        "control_cancel_request" => {
            let notice: CancelNotice = serde_json::from_value(value)?;
            Ok(InboundMessage::Cancel(notice))
        }
        _ => Ok(InboundMessage::Data(value)),
    }
}
