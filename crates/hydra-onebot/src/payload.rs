//! Frame direction and event classification.

use serde::Deserialize;
use serde_json::Value;

use crate::action::{ActionRequest, ActionResponse};
use crate::segment::Segment;
use crate::OnebotError;

/// A decoded inbound frame.
#[derive(Debug)]
pub enum Payload {
    Request(ActionRequest),
    Response(ActionResponse),
    Event(OnebotEvent),
}

/// Inbound event, classified by `post_type` and its sub-discriminators.
#[derive(Debug)]
pub enum OnebotEvent {
    /// `message` and `message_sent` posts.
    Message(MessageEvent),
    Lifecycle(LifecycleEvent),
    Heartbeat(HeartbeatEvent),
    GroupRecall(GroupRecallEvent),
    FriendRecall(FriendRecallEvent),
    /// `offline_file` notice: a friend sent a file out-of-band.
    OfflineFile(OfflineFileEvent),
    /// `group_upload` notice: a file landed in a group.
    GroupUpload(OfflineFileEvent),
    /// Recognized direction, unhandled body; kept for logging.
    Other(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    /// Group card name.
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub role: String,
}

impl Sender {
    /// Card wins over nickname for display.
    pub fn display_name(&self) -> String {
        if self.card.is_empty() {
            self.nickname.clone()
        } else {
            self.card.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    #[serde(default)]
    pub post_type: String,
    /// `private` or `group`.
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub user_id: i64,
    /// Receiver of a self-sent private message.
    #[serde(default)]
    pub target_id: i64,
    /// Forward bundles nest the list under `content` instead.
    #[serde(default, alias = "content")]
    pub message: Vec<Segment>,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    pub fn is_private(&self) -> bool {
        self.message_type == "private"
    }

    /// Messages echoed back for sends from other devices on the same
    /// account.
    pub fn is_self_sent(&self) -> bool {
        self.post_type == "message_sent"
    }

    /// The peer a private conversation belongs to: the sender, unless the
    /// message is self-sent — then the *target*.
    pub fn private_peer(&self) -> i64 {
        if self.is_self_sent() {
            self.target_id
        } else {
            self.sender.user_id
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    #[serde(default)]
    pub sub_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub status: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupRecallEvent {
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    #[serde(default)]
    pub message_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FriendRecallEvent {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub message_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineFileEvent {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub file: OfflineFileInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineFileInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub url: String,
}

/// Classify a raw frame by the discriminating field it carries:
/// `post_type` → event, `retcode` → response, `action` → request.
pub fn parse_payload(value: Value) -> Result<Payload, OnebotError> {
    if let Some(post_type) = value.get("post_type").and_then(Value::as_str) {
        let event = match post_type {
            "message" | "message_sent" => {
                OnebotEvent::Message(serde_json::from_value(value)?)
            }
            "meta_event" => parse_meta(value)?,
            "notice" => parse_notice(value)?,
            "request" => OnebotEvent::Other(value),
            other => return Err(OnebotError::UnsupportedEvent(other.to_string())),
        };
        return Ok(Payload::Event(event));
    }
    if value.get("retcode").is_some() {
        return Ok(Payload::Response(serde_json::from_value(value)?));
    }
    if value.get("action").is_some() {
        return Ok(Payload::Request(serde_json::from_value(value)?));
    }
    Err(OnebotError::UnsupportedPayload)
}

fn parse_meta(value: Value) -> Result<OnebotEvent, OnebotError> {
    match value.get("meta_event_type").and_then(Value::as_str) {
        Some("lifecycle") => Ok(OnebotEvent::Lifecycle(serde_json::from_value(value)?)),
        Some("heartbeat") => Ok(OnebotEvent::Heartbeat(serde_json::from_value(value)?)),
        _ => Ok(OnebotEvent::Other(value)),
    }
}

fn parse_notice(value: Value) -> Result<OnebotEvent, OnebotError> {
    match value.get("notice_type").and_then(Value::as_str) {
        Some("group_recall") => Ok(OnebotEvent::GroupRecall(serde_json::from_value(value)?)),
        Some("friend_recall") => Ok(OnebotEvent::FriendRecall(serde_json::from_value(value)?)),
        Some("offline_file") => Ok(OnebotEvent::OfflineFile(serde_json::from_value(value)?)),
        Some("group_upload") => Ok(OnebotEvent::GroupUpload(serde_json::from_value(value)?)),
        _ => Ok(OnebotEvent::Other(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_discriminating_field() {
        let event = parse_payload(serde_json::json!({
            "post_type": "message", "message_type": "group", "message_id": 5,
            "group_id": 7, "user_id": 3, "message": [], "sender": {"user_id": 3}
        }))
        .unwrap();
        assert!(matches!(event, Payload::Event(OnebotEvent::Message(_))));

        let response = parse_payload(serde_json::json!({
            "status": "ok", "retcode": 0, "echo": "1"
        }))
        .unwrap();
        assert!(matches!(response, Payload::Response(_)));

        let request = parse_payload(serde_json::json!({
            "action": "send_msg", "params": {}
        }))
        .unwrap();
        assert!(matches!(request, Payload::Request(_)));

        assert!(matches!(
            parse_payload(serde_json::json!({"foo": 1})),
            Err(OnebotError::UnsupportedPayload)
        ));
    }

    #[test]
    fn self_sent_private_message_targets_peer() {
        let event: MessageEvent = serde_json::from_value(serde_json::json!({
            "post_type": "message_sent", "message_type": "private",
            "message_id": 9, "user_id": 1000, "target_id": 2000,
            "sender": {"user_id": 1000, "nickname": "me"},
            "message": []
        }))
        .unwrap();
        assert!(event.is_self_sent());
        assert_eq!(event.private_peer(), 2000);
    }

    #[test]
    fn inbound_private_message_targets_sender() {
        let event: MessageEvent = serde_json::from_value(serde_json::json!({
            "post_type": "message", "message_type": "private",
            "message_id": 9, "user_id": 2000,
            "sender": {"user_id": 2000, "nickname": "peer"},
            "message": [{"type": "text", "data": {"text": "hi"}}]
        }))
        .unwrap();
        assert_eq!(event.private_peer(), 2000);
        assert_eq!(event.message.len(), 1);
    }

    #[test]
    fn forward_node_content_alias() {
        let event: MessageEvent = serde_json::from_value(serde_json::json!({
            "post_type": "message", "message_type": "group",
            "sender": {"user_id": 5, "nickname": "n"},
            "content": [{"type": "text", "data": {"text": "nested"}}]
        }))
        .unwrap();
        assert_eq!(event.message[0].text_content(), "nested");
    }

    #[test]
    fn notices_classify() {
        let recall = parse_payload(serde_json::json!({
            "post_type": "notice", "notice_type": "group_recall",
            "group_id": 7, "user_id": 3, "operator_id": 3, "message_id": 555
        }))
        .unwrap();
        assert!(matches!(
            recall,
            Payload::Event(OnebotEvent::GroupRecall(_))
        ));

        let upload = parse_payload(serde_json::json!({
            "post_type": "notice", "notice_type": "group_upload",
            "group_id": 7, "user_id": 3,
            "file": {"name": "a.zip", "size": 10, "url": "http://x/a.zip"}
        }))
        .unwrap();
        match upload {
            Payload::Event(OnebotEvent::GroupUpload(event)) => {
                assert_eq!(event.file.name, "a.zip");
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let unknown = parse_payload(serde_json::json!({
            "post_type": "notice", "notice_type": "group_ban"
        }))
        .unwrap();
        assert!(matches!(unknown, Payload::Event(OnebotEvent::Other(_))));
    }

    #[test]
    fn lifecycle_and_heartbeat_classify() {
        let lifecycle = parse_payload(serde_json::json!({
            "post_type": "meta_event", "meta_event_type": "lifecycle",
            "sub_type": "connect", "self_id": 9999
        }))
        .unwrap();
        match lifecycle {
            Payload::Event(OnebotEvent::Lifecycle(event)) => {
                assert_eq!(event.sub_type, "connect");
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let heartbeat = parse_payload(serde_json::json!({
            "post_type": "meta_event", "meta_event_type": "heartbeat",
            "interval": 5000, "status": {"online": true}
        }))
        .unwrap();
        assert!(matches!(
            heartbeat,
            Payload::Event(OnebotEvent::Heartbeat(_))
        ));
    }
}
