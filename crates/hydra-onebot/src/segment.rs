use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Known segment kinds.
pub mod kind {
    pub const TEXT: &str = "text";
    pub const FACE: &str = "face";
    pub const MARKET_FACE: &str = "mface";
    pub const IMAGE: &str = "image";
    pub const RECORD: &str = "record";
    pub const VIDEO: &str = "video";
    pub const FILE: &str = "file";
    pub const AT: &str = "at";
    pub const SHARE: &str = "share";
    pub const LOCATION: &str = "location";
    pub const REPLY: &str = "reply";
    pub const FORWARD: &str = "forward";
    pub const NODE: &str = "node";
    pub const XML: &str = "xml";
    pub const JSON: &str = "json";
}

/// An atomic payload element of a OneBot message: `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn text(content: &str) -> Self {
        Self::new(kind::TEXT).with("text", content)
    }

    pub fn image(file: &str) -> Self {
        Self::new(kind::IMAGE).with("file", file)
    }

    pub fn record(file: &str) -> Self {
        Self::new(kind::RECORD).with("file", file)
    }

    pub fn video(file: &str) -> Self {
        Self::new(kind::VIDEO).with("file", file)
    }

    pub fn file(file: &str, name: &str) -> Self {
        Self::new(kind::FILE).with("file", file).with("name", name)
    }

    pub fn at(target: &str) -> Self {
        Self::new(kind::AT).with("qq", target)
    }

    pub fn reply(id: &str) -> Self {
        Self::new(kind::REPLY).with("id", id)
    }

    pub fn json(content: &str) -> Self {
        Self::new(kind::JSON).with("data", content)
    }

    /// String field accessor; absent or non-string fields read as empty.
    pub fn str_field(&self, key: &str) -> &str {
        self.data.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn text_content(&self) -> &str {
        self.str_field("text")
    }

    pub fn face_id(&self) -> String {
        // some implementations send the id as a number
        match self.data.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn media_file(&self) -> &str {
        self.str_field("file")
    }

    pub fn url(&self) -> &str {
        self.str_field("url")
    }

    /// `file_id` where present, the `file` field otherwise (video and file
    /// segments differ between implementations).
    pub fn file_id(&self) -> &str {
        let id = self.str_field("file_id");
        if id.is_empty() {
            self.media_file()
        } else {
            id
        }
    }

    pub fn at_target(&self) -> &str {
        self.str_field("qq")
    }

    pub fn reply_id(&self) -> &str {
        self.str_field("id")
    }

    pub fn forward_id(&self) -> &str {
        self.str_field("id")
    }

    pub fn json_content(&self) -> &str {
        self.str_field("data")
    }

    /// Image segments doubling as stickers: marked by `sub_type` 1 or sent
    /// as a market face.
    pub fn is_sticker(&self) -> bool {
        if self.kind == kind::MARKET_FACE {
            return true;
        }
        match self.data.get("sub_type") {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s == "1",
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_segment_round_trip() {
        let segment = Segment::text("hello");
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "data": {"text": "hello"}}));

        let back: Segment = serde_json::from_value(json).unwrap();
        assert_eq!(back.text_content(), "hello");
    }

    #[test]
    fn missing_fields_read_empty() {
        let segment = Segment::new(kind::IMAGE);
        assert_eq!(segment.media_file(), "");
        assert_eq!(segment.url(), "");
    }

    #[test]
    fn file_id_falls_back_to_file() {
        let segment = Segment::new(kind::VIDEO).with("file", "abc.mp4");
        assert_eq!(segment.file_id(), "abc.mp4");

        let segment = segment.with("file_id", "f-1");
        assert_eq!(segment.file_id(), "f-1");
    }

    #[test]
    fn sticker_detection() {
        let plain: Segment = serde_json::from_value(
            serde_json::json!({"type": "image", "data": {"file": "a"}}),
        )
        .unwrap();
        assert!(!plain.is_sticker());

        let marked: Segment = serde_json::from_value(
            serde_json::json!({"type": "image", "data": {"file": "a", "sub_type": 1}}),
        )
        .unwrap();
        assert!(marked.is_sticker());

        let mface: Segment =
            serde_json::from_value(serde_json::json!({"type": "mface", "data": {}})).unwrap();
        assert!(mface.is_sticker());
    }

    #[test]
    fn numeric_face_id_reads_as_string() {
        let face: Segment =
            serde_json::from_value(serde_json::json!({"type": "face", "data": {"id": 14}}))
                .unwrap();
        assert_eq!(face.face_id(), "14");
    }
}
