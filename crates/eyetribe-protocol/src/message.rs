use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};
use crate::frame::FrameBlock;
use crate::status::{is_notice, is_ok, STATUS_OK};

/// Tracker state and data requests.
pub const CATEGORY_TRACKER: &str = "tracker";
/// Keep-alive messages.
pub const CATEGORY_HEARTBEAT: &str = "heartbeat";
/// Calibration procedure messages.
pub const CATEGORY_CALIBRATION: &str = "calibration";

/// Read one or more tracker values.
pub const REQUEST_GET: &str = "get";
/// Write one or more tracker values.
pub const REQUEST_SET: &str = "set";

pub const VALUE_FRAME: &str = "frame";
pub const VALUE_PUSH: &str = "push";
pub const VALUE_VERSION: &str = "version";
pub const VALUE_HEARTBEAT_INTERVAL: &str = "heartbeatinterval";
pub const VALUE_IS_CALIBRATED: &str = "iscalibrated";
pub const VALUE_FRAMERATE: &str = "framerate";
pub const VALUE_TRACKER_STATE: &str = "trackerstate";
pub const VALUE_STATUS_MESSAGE: &str = "statusmessage";

/// Classification of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    HandshakeRequest,
    HandshakeReply,
    Request,
    Reply,
    PushNotification,
    Error,
}

/// A typed outbound request carrying a correlation identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    #[serde(skip)]
    kind: MessageKind,
    category: &'static str,
    request: &'static str,
    id: u64,
    values: Value,
}

impl Request {
    /// `get` the listed tracker values.
    pub fn get(id: u64, fields: &[&str]) -> Self {
        Self::tracker(id, REQUEST_GET, Value::from(fields.to_vec()))
    }

    /// `set` the given tracker values.
    pub fn set(id: u64, values: Map<String, Value>) -> Self {
        Self::tracker(id, REQUEST_SET, Value::Object(values))
    }

    /// Declare the protocol version this client speaks.
    pub fn set_version(id: u64, version: u32) -> Self {
        Self::set(id, single(VALUE_VERSION, Value::from(version)))
    }

    /// Switch device streaming on (push) or off (pull).
    pub fn set_push(id: u64, push: bool) -> Self {
        Self::set(id, single(VALUE_PUSH, Value::Bool(push)))
    }

    /// Ask for the current gaze frame.
    pub fn get_frame(id: u64) -> Self {
        Self::get(id, &[VALUE_FRAME])
    }

    fn tracker(id: u64, verb: &'static str, values: Value) -> Self {
        Self {
            kind: MessageKind::Request,
            category: CATEGORY_TRACKER,
            request: verb,
            id,
            values,
        }
    }

    /// Mark this request as part of the connection handshake.
    pub fn into_handshake(mut self) -> Self {
        self.kind = MessageKind::HandshakeRequest;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn verb(&self) -> &'static str {
        self.request
    }

    /// True when the reply to this request is expected to carry a frame block.
    pub fn expects_frame(&self) -> bool {
        self.request == REQUEST_GET
            && self
                .values
                .as_array()
                .is_some_and(|fields| fields.iter().any(|f| f == VALUE_FRAME))
    }

    /// Serialize to wire bytes (without the delimiter).
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An outbound message that expects no correlated reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Value>,
}

impl Notice {
    /// Keep-alive the device expects every `heartbeatinterval` ms.
    pub fn heartbeat() -> Self {
        Self {
            category: CATEGORY_HEARTBEAT,
            request: None,
            values: None,
        }
    }

    /// Best-effort goodbye: ask the device to stop streaming to this client.
    pub fn disconnect() -> Self {
        Self {
            category: CATEGORY_TRACKER,
            request: Some(REQUEST_SET),
            values: Some(Value::Object(single(VALUE_PUSH, Value::Bool(false)))),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Serialize to wire bytes (without the delimiter).
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    map
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub kind: MessageKind,
    pub category: String,
    /// Request verb echoed by the device, if any.
    pub request: Option<String>,
    /// Correlation identifier echoed by the device, if any.
    pub id: Option<u64>,
    pub status: u16,
    pub values: Option<Value>,
    pub frame: Option<FrameBlock>,
}

impl ProtocolMessage {
    /// Look up one entry of the `values` object.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.as_ref().and_then(|values| values.get(key))
    }

    /// Human-readable status text sent with error replies.
    pub fn status_message(&self) -> Option<&str> {
        self.value(VALUE_STATUS_MESSAGE).and_then(Value::as_str)
    }

    pub fn is_frame_bearing(&self) -> bool {
        self.frame.is_some()
    }

    pub fn is_heartbeat(&self) -> bool {
        self.category == CATEGORY_HEARTBEAT
    }

    /// Re-tag the message, e.g. a reply recognised as answering the handshake.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Decode one wire payload into a [`ProtocolMessage`].
///
/// Fails with [`ProtocolError::Malformed`] when the payload is not a JSON
/// object, has no string `category`, or carries an undecodable frame block.
pub fn decode(payload: &[u8]) -> Result<ProtocolMessage> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|err| ProtocolError::Malformed(format!("invalid json: {err}")))?;
    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::Malformed(
            "expected a JSON object".to_string(),
        ));
    };

    let category = match obj.remove("category") {
        Some(Value::String(category)) => category,
        Some(_) => {
            return Err(ProtocolError::Malformed(
                "category must be a string".to_string(),
            ))
        }
        None => return Err(ProtocolError::Malformed("missing category".to_string())),
    };

    let request = match obj.remove("request") {
        Some(Value::String(verb)) => Some(verb),
        None | Some(Value::Null) => None,
        Some(_) => {
            return Err(ProtocolError::Malformed(
                "request must be a string".to_string(),
            ))
        }
    };

    let id = match obj.remove("id") {
        Some(Value::Null) | None => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            ProtocolError::Malformed(format!("id must be an unsigned integer, got {v}"))
        })?),
    };

    let status = match obj.remove("statuscode") {
        None => STATUS_OK,
        Some(v) => v
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .ok_or_else(|| ProtocolError::Malformed(format!("invalid statuscode {v}")))?,
    };

    let values = obj.remove("values");
    let frame = match values.as_ref().and_then(|values| values.get(VALUE_FRAME)) {
        Some(block) => Some(
            FrameBlock::deserialize(block)
                .map_err(|err| ProtocolError::Malformed(format!("invalid frame block: {err}")))?,
        ),
        None => None,
    };

    let kind = classify(&category, request.as_deref(), id, status, frame.is_some());

    Ok(ProtocolMessage {
        kind,
        category,
        request,
        id,
        status,
        values,
        frame,
    })
}

/// Structural classification; correlation against pending requests happens
/// in the session.
fn classify(
    category: &str,
    request: Option<&str>,
    id: Option<u64>,
    status: u16,
    has_frame: bool,
) -> MessageKind {
    if !is_ok(status) && !is_notice(status) {
        MessageKind::Error
    } else if id.is_some() {
        MessageKind::Reply
    } else if has_frame {
        MessageKind::PushNotification
    } else if request.is_some() || category == CATEGORY_HEARTBEAT {
        MessageKind::Reply
    } else {
        MessageKind::PushNotification
    }
}
