//! OneBot wire protocol.
//!
//! Frames are loose JSON objects; direction is inferred from the fields
//! present (`post_type` marks an inbound event, `retcode` a response,
//! `action` a request). Messages are composed of typed segments.

mod action;
mod payload;
mod segment;

pub use action::{ActionRequest, ActionResponse, FileInfo, FriendInfo, GroupInfo};
pub use payload::{
    parse_payload, FriendRecallEvent, GroupRecallEvent, HeartbeatEvent, LifecycleEvent,
    MessageEvent, OfflineFileEvent, OnebotEvent, Payload, Sender,
};
pub use segment::{kind, Segment};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnebotError {
    #[error("payload type not supported")]
    UnsupportedPayload,

    #[error("event {0} not supported")]
    UnsupportedEvent(String),

    #[error("{status} response retcode: {retcode}")]
    Retcode { status: String, retcode: i64 },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
