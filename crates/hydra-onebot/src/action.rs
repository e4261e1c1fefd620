use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::segment::Segment;
use crate::OnebotError;

/// An API call to the OneBot implementation. `echo` is the caller-chosen
/// correlation id mirrored back on the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub echo: String,
}

impl ActionRequest {
    fn new(action: &str, params: Value) -> Self {
        Self {
            action: action.to_string(),
            params,
            echo: String::new(),
        }
    }

    pub fn private_msg(user_id: i64, segments: Vec<Segment>) -> Self {
        Self::new(
            "send_msg",
            json!({
                "message_type": "private",
                "user_id": user_id,
                "message": segments,
            }),
        )
    }

    pub fn group_msg(group_id: i64, segments: Vec<Segment>) -> Self {
        Self::new(
            "send_msg",
            json!({
                "message_type": "group",
                "group_id": group_id,
                "message": segments,
            }),
        )
    }

    pub fn get_login_info() -> Self {
        Self::new("get_login_info", Value::Null)
    }

    pub fn get_friend_list() -> Self {
        Self::new("get_friend_list", Value::Null)
    }

    pub fn get_group_list() -> Self {
        Self::new("get_group_list", Value::Null)
    }

    pub fn get_group_member_info(group_id: i64, user_id: i64) -> Self {
        Self::new(
            "get_group_member_info",
            json!({ "group_id": group_id, "user_id": user_id }),
        )
    }

    pub fn get_record(file: &str) -> Self {
        Self::new("get_record", json!({ "file": file, "out_format": "amr" }))
    }

    pub fn get_image(file: &str) -> Self {
        Self::new("get_image", json!({ "file": file }))
    }

    pub fn get_file(file_id: &str) -> Self {
        Self::new("get_file", json!({ "file_id": file_id }))
    }

    pub fn get_msg(message_id: i64) -> Self {
        Self::new("get_msg", json!({ "message_id": message_id }))
    }

    /// Some implementations key the bundle on `id`, others on
    /// `message_id`; send both.
    pub fn get_forward_msg(id: &str) -> Self {
        Self::new("get_forward_msg", json!({ "id": id, "message_id": id }))
    }
}

/// `{status, retcode, data, echo}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub echo: String,
}

impl ActionResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Consume the response, yielding its payload or the retcode error.
    pub fn into_data(self) -> Result<Value, OnebotError> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            Err(OnebotError::Retcode {
                status: self.status,
                retcode: self.retcode,
            })
        }
    }

    pub fn message_id(&self) -> Option<i64> {
        let id = self.data.get("message_id")?;
        id.as_i64().or_else(|| id.as_f64().map(|f| f as i64))
    }
}

/// Roster entry for a friend (and the logged-in account itself).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FriendInfo {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

impl FriendInfo {
    /// Remark wins over nickname for display.
    pub fn display_name(&self) -> String {
        if self.remark.is_empty() {
            self.nickname.clone()
        } else {
            self.remark.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupInfo {
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub group_name: String,
}

/// Media fetch result from `get_record` / `get_image` / `get_file`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub base64: String,
    #[serde(default)]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_msg_request_shape() {
        let request = ActionRequest::group_msg(7, vec![Segment::text("hello")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "send_msg");
        assert_eq!(json["params"]["message_type"], "group");
        assert_eq!(json["params"]["group_id"], 7);
        assert_eq!(json["params"]["message"][0]["data"]["text"], "hello");
        assert!(json.get("echo").is_none());
    }

    #[test]
    fn echo_serializes_when_set() {
        let mut request = ActionRequest::get_login_info();
        request.echo = "12".into();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["echo"], "12");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn response_payload_or_retcode() {
        let ok: ActionResponse = serde_json::from_value(serde_json::json!({
            "status": "ok", "retcode": 0, "data": {"message_id": 555}, "echo": "1"
        }))
        .unwrap();
        assert_eq!(ok.message_id(), Some(555));
        assert!(ok.into_data().is_ok());

        let failed: ActionResponse = serde_json::from_value(serde_json::json!({
            "status": "failed", "retcode": 1400, "echo": "2"
        }))
        .unwrap();
        assert!(matches!(
            failed.into_data(),
            Err(OnebotError::Retcode { retcode: 1400, .. })
        ));
    }
}
