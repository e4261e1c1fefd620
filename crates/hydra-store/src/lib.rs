//! SQLite persistence for the bridge: the chat registry, cross-system
//! links, forum-topic mappings, and the message identity map.

mod chat;
mod db;
mod error;
mod link;
mod message;
mod pager;
mod topic;

pub use chat::ChatRow;
pub use db::Store;
pub use error::StoreError;
pub use link::LinkRow;
pub use message::{MessageRow, NewMessage};
pub use pager::{calc_pager, Pager};
pub use topic::TopicRow;
