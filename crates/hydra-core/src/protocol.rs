//! Limb wire protocol: correlated `{id, type, data}` frames over WebSocket.
//!
//! Frame kinds are integer-coded. A frame is either a request
//! (disconnect / ping / event) or a response (closed / ping / event); an
//! event payload is a full [`Event`]. Errors ride on the response as a
//! sidecar `{code, message}` body and, on the HTTP upgrade surface, carry a
//! status code as well.

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    Request = 0,
    Response = 1,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            other => Err(format!("message kind {other} unknown")),
        }
    }
}

pub const REQ_DISCONNECT: u8 = 0;
pub const REQ_PING: u8 = 1;
pub const REQ_EVENT: u8 = 2;

pub const RESP_CLOSED: u8 = 0;
pub const RESP_PING: u8 = 1;
pub const RESP_EVENT: u8 = 2;

/// Error body surfaced on responses and on rejected HTTP upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A correlated frame. `id` pairs a response with its request.
#[derive(Debug)]
pub struct WireMessage {
    pub id: i64,
    pub body: WireBody,
}

#[derive(Debug)]
pub enum WireBody {
    Request(WireRequest),
    Response(WireResponse),
}

impl WireMessage {
    pub fn request(id: i64, request: WireRequest) -> Self {
        Self {
            id,
            body: WireBody::Request(request),
        }
    }

    pub fn response(id: i64, response: WireResponse) -> Self {
        Self {
            id,
            body: WireBody::Response(response),
        }
    }
}

#[derive(Debug)]
pub enum WireRequest {
    Disconnect,
    Ping,
    Event(Box<Event>),
}

impl WireRequest {
    fn kind(&self) -> u8 {
        match self {
            WireRequest::Disconnect => REQ_DISCONNECT,
            WireRequest::Ping => REQ_PING,
            WireRequest::Event(_) => REQ_EVENT,
        }
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::json!({ "type": self.kind() });
        if let WireRequest::Event(event) = self {
            value["data"] = serde_json::to_value(event)?;
        }
        Ok(value)
    }

    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_u64)
            .unwrap_or(REQ_DISCONNECT as u64) as u8;
        Ok(match kind {
            REQ_DISCONNECT => WireRequest::Disconnect,
            REQ_PING => WireRequest::Ping,
            REQ_EVENT => {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                WireRequest::Event(Box::new(serde_json::from_value(data)?))
            }
            other => {
                return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                    "request kind {other} unknown"
                )))
            }
        })
    }
}

/// Response body plus optional sidecar error. When the error is present the
/// payload is not decoded.
#[derive(Debug)]
pub struct WireResponse {
    pub error: Option<ErrorBody>,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub enum ResponseBody {
    Closed,
    Ping,
    Event(Box<Event>),
}

impl WireResponse {
    pub fn event(event: Event) -> Self {
        Self {
            error: None,
            body: ResponseBody::Event(Box::new(event)),
        }
    }

    fn kind(&self) -> u8 {
        match self.body {
            ResponseBody::Closed => RESP_CLOSED,
            ResponseBody::Ping => RESP_PING,
            ResponseBody::Event(_) => RESP_EVENT,
        }
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::json!({ "type": self.kind() });
        if let Some(error) = &self.error {
            value["error"] = serde_json::to_value(error)?;
        }
        if let ResponseBody::Event(event) = &self.body {
            value["data"] = serde_json::to_value(event)?;
        }
        Ok(value)
    }

    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_u64)
            .unwrap_or(RESP_CLOSED as u64) as u8;
        let error: Option<ErrorBody> = match value.get("error") {
            Some(raw) if !raw.is_null() => Some(serde_json::from_value(raw.clone())?),
            _ => None,
        };
        let body = match kind {
            RESP_CLOSED => ResponseBody::Closed,
            RESP_PING => ResponseBody::Ping,
            RESP_EVENT if error.is_some() => ResponseBody::Closed,
            RESP_EVENT => {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                ResponseBody::Event(Box::new(serde_json::from_value(data)?))
            }
            other => {
                return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                    "response kind {other} unknown"
                )))
            }
        };
        Ok(Self { error, body })
    }
}

impl Serialize for WireMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (kind, data) = match &self.body {
            WireBody::Request(request) => (
                MessageKind::Request,
                request.to_value().map_err(S::Error::custom)?,
            ),
            WireBody::Response(response) => (
                MessageKind::Response,
                response.to_value().map_err(S::Error::custom)?,
            ),
        };
        let mut frame = serializer.serialize_struct("WireMessage", 3)?;
        frame.serialize_field("id", &self.id)?;
        frame.serialize_field("type", &u8::from(kind))?;
        frame.serialize_field("data", &data)?;
        frame.end()
    }
}

impl<'de> Deserialize<'de> for WireMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Frame {
            #[serde(default)]
            id: i64,
            #[serde(rename = "type", default)]
            kind: u8,
            #[serde(default)]
            data: Value,
        }

        let frame = Frame::deserialize(deserializer)?;
        let kind = MessageKind::try_from(frame.kind).map_err(D::Error::custom)?;
        let body = match kind {
            MessageKind::Request => WireBody::Request(
                WireRequest::from_value(frame.data).map_err(D::Error::custom)?,
            ),
            MessageKind::Response => WireBody::Response(
                WireResponse::from_value(frame.data).map_err(D::Error::custom)?,
            ),
        };
        Ok(WireMessage { id: frame.id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chat, EventKind, Vendor};

    #[test]
    fn event_request_round_trip() {
        let mut event = Event::new(Vendor::new("qq", "9999"), "", 0);
        event.kind = EventKind::Text;
        event.content = "hello".into();
        event.chat = Chat {
            id: "7".into(),
            kind: "group".into(),
            title: String::new(),
        };
        let frame = WireMessage::request(3, WireRequest::Event(Box::new(event)));

        let json = serde_json::to_string(&frame).unwrap();
        let decoded: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, 3);
        match decoded.body {
            WireBody::Request(WireRequest::Event(event)) => {
                assert_eq!(event.content, "hello");
                assert_eq!(event.chat.id, "7");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn event_response_carries_ack_identity() {
        let json = serde_json::json!({
            "id": 3,
            "type": 1,
            "data": {
                "type": 2,
                "data": { "id": "555", "timestamp": 1700000000, "type": 0 }
            }
        });
        let decoded: WireMessage = serde_json::from_value(json).unwrap();
        match decoded.body {
            WireBody::Response(response) => {
                assert!(response.error.is_none());
                match response.body {
                    ResponseBody::Event(event) => {
                        assert_eq!(event.id, "555");
                        assert_eq!(event.timestamp, 1_700_000_000);
                    }
                    other => panic!("unexpected body: {other:?}"),
                }
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn error_response_skips_payload_decoding() {
        let json = serde_json::json!({
            "id": 4,
            "type": 1,
            "data": {
                "type": 2,
                "error": { "code": "SEND_FAILED", "message": "no session" },
                "data": "not an event"
            }
        });
        let decoded: WireMessage = serde_json::from_value(json).unwrap();
        match decoded.body {
            WireBody::Response(response) => {
                let error = response.error.expect("error body");
                assert_eq!(error.code, "SEND_FAILED");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn closed_response_decodes() {
        let json = serde_json::json!({
            "id": 9,
            "type": 1,
            "data": { "type": 0, "data": "client_shutting_down" }
        });
        let decoded: WireMessage = serde_json::from_value(json).unwrap();
        match decoded.body {
            WireBody::Response(WireResponse {
                error: None,
                body: ResponseBody::Closed,
            }) => {}
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
