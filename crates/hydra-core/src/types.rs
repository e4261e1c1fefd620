//! The unified event envelope and its building blocks.
//!
//! Every message crossing the bridge — in either direction — is normalized
//! into an [`Event`]. The `data` payload is polymorphic and keyed on the
//! event kind, mirroring the wire encoding where `data` sits next to a
//! `type` discriminator.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BridgeError;

pub const VENDOR_SEP: char = ';';

/// Prefix marking blob references inside rendered rich-card HTML.
pub const REMOTE_PREFIX: &str = "remote:";

/// A vendor account: the family (`telegram`, `qq`, `wechat`, …) plus the
/// logged-in uid within it. Printed as `kind;uid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uid: String,
}

impl Vendor {
    pub fn new(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uid: uid.into(),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.kind, VENDOR_SEP, self.uid)
    }
}

impl FromStr for Vendor {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(VENDOR_SEP).collect();
        if parts.len() != 2 {
            return Err(BridgeError::InvalidVendor(s.to_string()));
        }
        Ok(Vendor::new(parts[0], parts[1]))
    }
}

/// A fully-qualified chat address on one side of the bridge.
/// Printed as `kind;uid;chat_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Limb {
    pub kind: String,
    pub uid: String,
    pub chat_id: String,
}

impl Limb {
    pub fn new(
        kind: impl Into<String>,
        uid: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            uid: uid.into(),
            chat_id: chat_id.into(),
        }
    }

    /// The limb addressing `chat_id` on the given vendor account.
    pub fn of(vendor: &Vendor, chat_id: impl Into<String>) -> Self {
        Self::new(vendor.kind.clone(), vendor.uid.clone(), chat_id)
    }

    pub fn vendor(&self) -> Vendor {
        Vendor::new(self.kind.clone(), self.uid.clone())
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.kind, VENDOR_SEP, self.uid, VENDOR_SEP, self.chat_id
        )
    }
}

impl FromStr for Limb {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(VENDOR_SEP).collect();
        if parts.len() != 3 {
            return Err(BridgeError::InvalidLimb(s.to_string()));
        }
        Ok(Limb::new(parts[0], parts[1], parts[2]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// `private` or `group`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

/// Handle to a quoted message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyInfo {
    pub id: String,
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime: String,
    #[serde(
        with = "base64_bytes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub binary: Vec<u8>,
}

/// Rich card or flattened forwarded conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(rename = "desc", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "raw", default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blobs: HashMap<String, BlobData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub latitude: f64,
}

/// Event kinds, wire-encoded as integers in the limb protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventKind {
    Text = 0,
    Photo = 1,
    Audio = 2,
    Video = 3,
    File = 4,
    Location = 5,
    Notice = 6,
    App = 7,
    Revoke = 8,
    Voip = 9,
    System = 10,
    Sync = 11,
    Observe = 12,
    Sticker = 13,
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::Text
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => EventKind::Text,
            1 => EventKind::Photo,
            2 => EventKind::Audio,
            3 => EventKind::Video,
            4 => EventKind::File,
            5 => EventKind::Location,
            6 => EventKind::Notice,
            7 => EventKind::App,
            8 => EventKind::Revoke,
            9 => EventKind::Voip,
            10 => EventKind::System,
            11 => EventKind::Sync,
            12 => EventKind::Observe,
            13 => EventKind::Sticker,
            other => return Err(format!("event kind {other} unknown")),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Text => "text",
            EventKind::Photo => "photo",
            EventKind::Audio => "audio",
            EventKind::Video => "video",
            EventKind::File => "file",
            EventKind::Location => "location",
            EventKind::Notice => "notice",
            EventKind::App => "app",
            EventKind::Revoke => "revoke",
            EventKind::Voip => "voip",
            EventKind::System => "system",
            EventKind::Sync => "sync",
            EventKind::Observe => "observe",
            EventKind::Sticker => "sticker",
        };
        f.write_str(name)
    }
}

/// Polymorphic event payload. The JSON codec keys on the event kind: photo
/// carries a blob list, sticker/audio/video/file a single blob, sync the
/// vendor's chat roster.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Photo(Vec<BlobData>),
    Blob(BlobData),
    Location(LocationData),
    App(Box<AppData>),
    Sync(Vec<Chat>),
}

impl EventData {
    /// Decode a raw `data` value according to the event kind. Kinds without
    /// a payload ignore the value.
    pub fn decode(
        kind: EventKind,
        value: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        Ok(match kind {
            EventKind::Photo => Some(EventData::Photo(serde_json::from_value(value)?)),
            EventKind::Sticker | EventKind::Audio | EventKind::Video | EventKind::File => {
                Some(EventData::Blob(serde_json::from_value(value)?))
            }
            EventKind::Location => Some(EventData::Location(serde_json::from_value(value)?)),
            EventKind::App => Some(EventData::App(serde_json::from_value(value)?)),
            EventKind::Sync => Some(EventData::Sync(serde_json::from_value(value)?)),
            _ => None,
        })
    }

    pub fn as_blob(&self) -> Option<&BlobData> {
        match self {
            EventData::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_photos(&self) -> Option<&[BlobData]> {
        match self {
            EventData::Photo(photos) => Some(photos),
            _ => None,
        }
    }
}

impl Serialize for EventData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EventData::Photo(photos) => photos.serialize(serializer),
            EventData::Blob(blob) => blob.serialize(serializer),
            EventData::Location(location) => location.serialize(serializer),
            EventData::App(app) => app.serialize(serializer),
            EventData::Sync(chats) => chats.serialize(serializer),
        }
    }
}

/// One-shot completion hook invoked by the dispatcher once an outbound send
/// has resolved. Called exactly once; the event carries the vendor-assigned
/// id and timestamp on success.
pub type EventCallback = Box<dyn FnOnce(Result<Event, BridgeError>) + Send + Sync + 'static>;

/// The universal message envelope.
#[derive(Default)]
pub struct Event {
    pub vendor: Vendor,
    /// Vendor-local message id.
    pub id: String,
    pub thread_id: String,
    /// Vendor-reported timestamp, stored verbatim.
    pub timestamp: i64,
    pub from: User,
    pub chat: Chat,
    pub kind: EventKind,
    /// Text payload or caption.
    pub content: String,
    pub reply: Option<ReplyInfo>,
    pub data: Option<EventData>,
    /// Never serialized; consumed by [`Event::resolve`].
    pub callback: Option<EventCallback>,
}

impl Event {
    pub fn new(vendor: Vendor, id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            vendor,
            id: id.into(),
            timestamp,
            ..Default::default()
        }
    }

    /// Fire the completion callback, if any. Safe to call more than once;
    /// only the first call observes the hook.
    pub fn resolve(&mut self, result: Result<Event, BridgeError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// The limb address of this event's chat on its vendor.
    pub fn slave_limb(&self) -> Limb {
        Limb::of(&self.vendor, self.chat.id.clone())
    }

    /// Copy of the wire-visible payload. The callback stays behind — it is
    /// single-shot and belongs to the original.
    pub fn clone_payload(&self) -> Event {
        Event {
            vendor: self.vendor.clone(),
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            timestamp: self.timestamp,
            from: self.from.clone(),
            chat: self.chat.clone(),
            kind: self.kind,
            content: self.content.clone(),
            reply: self.reply.clone(),
            data: self.data.clone(),
            callback: None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("vendor", &self.vendor)
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("timestamp", &self.timestamp)
            .field("from", &self.from)
            .field("chat", &self.chat)
            .field("kind", &self.kind)
            .field("content", &self.content)
            .field("reply", &self.reply)
            .field("data", &self.data)
            .field("callback", &self.callback.as_ref().map(|_| "..."))
            .finish()
    }
}

fn i64_is_zero(v: &i64) -> bool {
    *v == 0
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Raw<'a> {
            vendor: &'a Vendor,
            #[serde(skip_serializing_if = "str::is_empty")]
            id: &'a str,
            #[serde(skip_serializing_if = "str::is_empty")]
            thread_id: &'a str,
            #[serde(skip_serializing_if = "i64_is_zero")]
            timestamp: i64,
            from: &'a User,
            chat: &'a Chat,
            #[serde(rename = "type")]
            kind: EventKind,
            #[serde(skip_serializing_if = "str::is_empty")]
            content: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply: &'a Option<ReplyInfo>,
            #[serde(skip_serializing_if = "Option::is_none")]
            data: &'a Option<EventData>,
        }

        Raw {
            vendor: &self.vendor,
            id: &self.id,
            thread_id: &self.thread_id,
            timestamp: self.timestamp,
            from: &self.from,
            chat: &self.chat,
            kind: self.kind,
            content: &self.content,
            reply: &self.reply,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            vendor: Vendor,
            #[serde(default)]
            id: String,
            #[serde(default)]
            thread_id: String,
            #[serde(default)]
            timestamp: i64,
            #[serde(default)]
            from: User,
            #[serde(default)]
            chat: Chat,
            #[serde(rename = "type", default)]
            kind: EventKind,
            #[serde(default)]
            content: String,
            #[serde(default)]
            reply: Option<ReplyInfo>,
            #[serde(default)]
            data: Option<serde_json::Value>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let data = match raw.data {
            Some(value) if !value.is_null() => {
                EventData::decode(raw.kind, value).map_err(D::Error::custom)?
            }
            _ => None,
        };
        Ok(Event {
            vendor: raw.vendor,
            id: raw.id,
            thread_id: raw.thread_id,
            timestamp: raw.timestamp,
            from: raw.from,
            chat: raw.chat,
            kind: raw.kind,
            content: raw.content,
            reply: raw.reply,
            data,
            callback: None,
        })
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_round_trip() {
        let vendor = Vendor::new("qq", "9999");
        assert_eq!(vendor.to_string(), "qq;9999");
        assert_eq!("qq;9999".parse::<Vendor>().unwrap(), vendor);
    }

    #[test]
    fn limb_round_trip() {
        let limb = Limb::new("telegram", "42", "-100123");
        assert_eq!(limb.to_string(), "telegram;42;-100123");
        assert_eq!("telegram;42;-100123".parse::<Limb>().unwrap(), limb);
    }

    #[test]
    fn malformed_addresses_error() {
        assert!("qq".parse::<Vendor>().is_err());
        assert!("qq;1;2".parse::<Vendor>().is_err());
        assert!("qq;1".parse::<Limb>().is_err());
        assert!("a;b;c;d".parse::<Limb>().is_err());
    }

    #[test]
    fn photo_event_data_decodes_as_blob_list() {
        let json = serde_json::json!({
            "vendor": {"type": "qq", "uid": "9"},
            "id": "55",
            "timestamp": 1700000000,
            "from": {"id": "7"},
            "chat": {"id": "g1", "type": "group"},
            "type": 1,
            "data": [{"name": "a.png", "mime": "image/png", "binary": "aGk="}]
        });
        let event: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event.kind, EventKind::Photo);
        let photos = event.data.as_ref().and_then(|d| d.as_photos()).unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].binary, b"hi");
    }

    #[test]
    fn sticker_event_data_decodes_as_single_blob() {
        let json = serde_json::json!({
            "type": 13,
            "data": {"name": "s.webp", "mime": "image/webp", "binary": "aGk="}
        });
        let event: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event.kind, EventKind::Sticker);
        assert!(event.data.as_ref().and_then(|d| d.as_blob()).is_some());
    }

    #[test]
    fn serialization_omits_empty_fields() {
        let event = Event::new(Vendor::new("qq", "9"), "1", 0);
        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("content"));
        assert!(!obj.contains_key("reply"));
        assert!(!obj.contains_key("data"));
        assert!(!obj.contains_key("timestamp"));
        assert_eq!(obj["type"], 0);
    }

    #[test]
    fn reply_timestamp_uses_ts_key() {
        let reply = ReplyInfo {
            id: "5".into(),
            timestamp: 9,
            sender: "x".into(),
            content: "c".into(),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["ts"], 9);
    }

    #[test]
    fn resolve_fires_callback_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let mut event = Event::default();
        event.callback = Some(Box::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        event.resolve(Ok(Event::default()));
        event.resolve(Ok(Event::default()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
