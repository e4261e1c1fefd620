//! Forum-topic provisioning for archive supergroups and forum-linked
//! chats.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ThreadId};
use tracing::warn;

use hydra_core::types::Event;

use crate::error::MasterError;
use crate::service::MasterContext;
use crate::text::{decorated_title, display_name};

/// A resolved Telegram destination: chat, optional topic thread, and the
/// title line prefixed to rendered messages.
#[derive(Debug, Clone)]
pub(crate) struct ChatDest {
    pub id: ChatId,
    pub thread_id: Option<ThreadId>,
    pub title: String,
}

impl ChatDest {
    pub fn plain(id: ChatId, event: &Event) -> Self {
        Self {
            id,
            thread_id: None,
            title: format!("{}:", display_name(&event.from)),
        }
    }

    pub fn decorated(id: ChatId, event: &Event) -> Self {
        Self {
            id,
            thread_id: None,
            title: decorated_title(&event.from, &event.chat),
        }
    }
}

/// Resolve the forum destination for `event` inside `chat_id`, creating
/// the topic on first use. Falls back to the default topic with a
/// decorated title when the topic cannot be provided.
pub(crate) async fn forum_dest(
    bot: &Bot,
    ctx: &Arc<MasterContext>,
    chat_id: i64,
    event: &Event,
) -> ChatDest {
    let master_limb = ctx.master_limb(ChatId(chat_id));
    let slave_limb = event.slave_limb().to_string();

    match get_or_create_topic(bot, ctx, chat_id, &event.chat.title, &master_limb, &slave_limb)
        .await
    {
        Some(topic_id) => ChatDest {
            id: ChatId(chat_id),
            thread_id: Some(ThreadId(MessageId(topic_id as i32))),
            title: format!("{}:", display_name(&event.from)),
        },
        None => ChatDest::decorated(ChatId(chat_id), event),
    }
}

/// Reuse the persisted topic when present, otherwise ask Telegram for a new
/// forum topic and persist the assigned thread id.
async fn get_or_create_topic(
    bot: &Bot,
    ctx: &Arc<MasterContext>,
    chat_id: i64,
    title: &str,
    master_limb: &str,
    slave_limb: &str,
) -> Option<i64> {
    match ctx.store.get_topic(master_limb, slave_limb) {
        Ok(Some(topic)) => return Some(topic.topic_id),
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "failed to get topic");
            return None;
        }
    }

    match bot.create_forum_topic(ChatId(chat_id), title).await {
        Ok(topic) => {
            let topic_id = i64::from(topic.message_thread_id.0 .0);
            if let Err(e) = ctx.store.add_topic(master_limb, slave_limb, topic_id) {
                warn!(error = %e, "failed to add topic");
            }
            Some(topic_id)
        }
        Err(e) => {
            warn!(error = %e, chat_id, "failed to create topic");
            None
        }
    }
}

/// Like [`forum_dest`] but for linked chats, where a non-forum group is
/// the common case: a failed creation marks the chat as non-forum so the
/// probe is not repeated, and the fallback keeps the undecorated title.
pub(crate) async fn linked_dest(
    bot: &Bot,
    ctx: &Arc<MasterContext>,
    chat_id: i64,
    event: &Event,
) -> Result<ChatDest, MasterError> {
    if ctx.non_forum.contains(&chat_id) {
        return Ok(ChatDest::plain(ChatId(chat_id), event));
    }

    let master_limb = ctx.master_limb(ChatId(chat_id));
    let slave_limb = event.slave_limb().to_string();

    if let Some(topic) = ctx.store.get_topic(&master_limb, &slave_limb)? {
        return Ok(ChatDest {
            id: ChatId(chat_id),
            thread_id: Some(ThreadId(MessageId(topic.topic_id as i32))),
            title: format!("{}:", display_name(&event.from)),
        });
    }

    match bot.create_forum_topic(ChatId(chat_id), &event.chat.title).await {
        Ok(topic) => {
            let topic_id = i64::from(topic.message_thread_id.0 .0);
            if let Err(e) = ctx.store.add_topic(&master_limb, &slave_limb, topic_id) {
                warn!(error = %e, "failed to add topic");
            }
            Ok(ChatDest {
                id: ChatId(chat_id),
                thread_id: Some(ThreadId(MessageId(topic_id as i32))),
                title: format!("{}:", display_name(&event.from)),
            })
        }
        Err(e) => {
            // Most likely a plain group; stop probing it.
            warn!(error = %e, chat_id, "topic creation failed, treating chat as non-forum");
            ctx.non_forum.insert(chat_id);
            Ok(ChatDest::plain(ChatId(chat_id), event))
        }
    }
}
