//! Admin commands and their inline-keyboard flows.

use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, ChatKind, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode,
    PublicChatKind, ThreadId,
};
use tracing::warn;

use hydra_core::types::Limb;
use hydra_store::calc_pager;

use crate::callback::Callback;
use crate::error::MasterError;
use crate::service::{MasterContext, MASTER_VENDOR};
use crate::text::escape_markdown;

/// Bound links listed above the /link keyboard before truncating.
const MAX_SHOWN_LINKS: usize = 7;

const HELP_TEXT: &str =
    "help - Show command list.\nlink - Manage remote chat link.\nchat - Generate a remote chat head.";

/// Where a flow was entered from: a fresh command message (send a new
/// keyboard) or a callback on an existing keyboard (edit in place).
pub(crate) struct Origin {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
    pub message_id: Option<MessageId>,
}

impl Origin {
    pub fn command(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            thread_id: msg.thread_id,
            message_id: None,
        }
    }

    pub fn callback(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            thread_id: msg.thread_id,
            message_id: Some(msg.id),
        }
    }
}

pub(crate) fn chat_is_forum(chat: &teloxide::types::Chat) -> bool {
    match &chat.kind {
        ChatKind::Public(public) => match &public.kind {
            PublicChatKind::Supergroup(group) => group.is_forum,
            _ => false,
        },
        _ => false,
    }
}

pub(crate) async fn handle_command(
    bot: &Bot,
    msg: &Message,
    ctx: &MasterContext,
) -> Result<(), MasterError> {
    let text = msg.text().unwrap_or("");
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;

    if text.starts_with("/help") {
        bot.send_message(msg.chat.id, HELP_TEXT).await?;
        return Ok(());
    }

    if text.starts_with("/link") {
        if chat_is_forum(&msg.chat) && msg.thread_id.is_some() {
            let mut request = bot.send_message(msg.chat.id, "Link in topic not support.");
            if let Some(thread_id) = msg.thread_id {
                request = request.message_thread_id(thread_id);
            }
            request.await?;
            return Ok(());
        }
        if msg.chat.is_private() {
            bot.send_message(msg.chat.id, "Link in private chat does not support.")
                .await?;
            return Ok(());
        }
        let callback = Callback::list("link", command_query(text));
        return handle_link(bot, ctx, user_id, Origin::command(msg), callback).await;
    }

    if text.starts_with("/chat") {
        let callback = Callback::list("chat", command_query(text));
        return handle_chat(bot, ctx, user_id, Origin::command(msg), callback).await;
    }

    let mut request = bot.send_message(msg.chat.id, "Command not support.");
    if let Some(thread_id) = msg.thread_id {
        request = request.message_thread_id(thread_id);
    }
    request.await?;
    Ok(())
}

fn command_query(text: &str) -> &str {
    let parts: Vec<&str> = text.split(' ').collect();
    if parts.len() == 2 {
        parts[1]
    } else {
        ""
    }
}

pub(crate) async fn handle_link(
    bot: &Bot,
    ctx: &MasterContext,
    user_id: i64,
    origin: Origin,
    callback: Callback,
) -> Result<(), MasterError> {
    match callback.action.as_str() {
        "close" => return close_keyboard(bot, &origin).await,
        "bind" => {
            let master_limb =
                Limb::new(MASTER_VENDOR, user_id.to_string(), origin.chat_id.to_string());
            if let Err(e) = ctx
                .store
                .add_link(&master_limb.to_string(), &callback.data)
            {
                warn!(error = %e, "add link failed");
            }
        }
        "unbind" => match callback.data.parse::<i64>() {
            Ok(id) => {
                if let Err(e) = ctx.store.delete_link(id) {
                    warn!(error = %e, "delete link failed");
                }
            }
            Err(e) => warn!(error = %e, data = %callback.data, "bad unbind payload"),
        },
        _ => {}
    }

    show_links(bot, ctx, user_id, origin, callback).await
}

pub(crate) async fn handle_chat(
    bot: &Bot,
    ctx: &MasterContext,
    user_id: i64,
    origin: Origin,
    callback: Callback,
) -> Result<(), MasterError> {
    match callback.action.as_str() {
        "close" => return close_keyboard(bot, &origin).await,
        "talk" => return start_talk(bot, ctx, user_id, origin, callback).await,
        _ => {}
    }

    show_chats(bot, ctx, origin, callback).await
}

async fn close_keyboard(bot: &Bot, origin: &Origin) -> Result<(), MasterError> {
    if let Some(message_id) = origin.message_id {
        bot.edit_message_text(origin.chat_id, message_id, "_Canceled by user._")
            .parse_mode(ParseMode::Markdown)
            .await?;
    }
    Ok(())
}

/// Persist a zero-id placeholder row so replies to the keyboard message
/// resolve to the chosen chat from now on.
async fn start_talk(
    bot: &Bot,
    ctx: &MasterContext,
    user_id: i64,
    origin: Origin,
    callback: Callback,
) -> Result<(), MasterError> {
    let Some(chat) = ctx.store.get_chat(&callback.data)? else {
        warn!(limb = %callback.data, "talk target unknown");
        return Ok(());
    };
    let Some(message_id) = origin.message_id else {
        return Ok(());
    };

    let master_limb = Limb::new(MASTER_VENDOR, user_id.to_string(), origin.chat_id.to_string());
    ctx.store.add_message(&hydra_store::NewMessage {
        master_limb: master_limb.to_string(),
        master_msg_id: message_id.0.to_string(),
        master_msg_thread_id: origin
            .thread_id
            .map(|thread_id| thread_id.0 .0.to_string())
            .unwrap_or_else(|| "0".to_string()),
        slave_limb: chat.limb.clone(),
        slave_msg_id: "0".to_string(),
        ..Default::default()
    })?;

    bot.edit_message_text(
        origin.chat_id,
        message_id,
        format!(
            "*Reply this message to talk with {}*",
            escape_markdown(&chat.title)
        ),
    )
    .parse_mode(ParseMode::Markdown)
    .await?;
    Ok(())
}

async fn show_links(
    bot: &Bot,
    ctx: &MasterContext,
    user_id: i64,
    origin: Origin,
    callback: Callback,
) -> Result<(), MasterError> {
    let master_limb =
        Limb::new(MASTER_VENDOR, user_id.to_string(), origin.chat_id.to_string()).to_string();

    let count = ctx.store.chat_count(&callback.query)?;
    let pager = calc_pager(callback.page, ctx.config.master.page_size, count);
    let links = ctx.store.link_list()?;
    let chats = ctx
        .store
        .chat_list(pager.current_page, ctx.config.master.page_size, &callback.query)?;

    if chats.is_empty() {
        let mut request = bot.send_message(origin.chat_id, "No chat currently available.");
        if let Some(thread_id) = origin.thread_id {
            request = request.message_thread_id(thread_id);
        }
        request.await?;
        return Ok(());
    }

    let mut text = String::from("Links:");
    let bound: Vec<_> = links
        .iter()
        .filter(|link| link.master_limb == master_limb)
        .collect();
    for link in bound.iter().take(MAX_SHOWN_LINKS) {
        if let Ok(limb) = link.slave_limb.parse::<Limb>() {
            text.push_str(&format!(
                "\n🔗{}({}) from ({} {})",
                link.title, limb.chat_id, limb.kind, limb.uid
            ));
        }
    }
    if bound.len() > MAX_SHOWN_LINKS {
        text.push_str(&format!("\n\nand {} more...", bound.len() - MAX_SHOWN_LINKS));
    }

    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for chat in &chats {
        let Ok(limb) = chat.limb.parse::<Limb>() else {
            continue;
        };
        let mut info = format!("{}({}) from ({} {})", chat.title, limb.chat_id, limb.kind, limb.uid);
        info = if chat.chat_type == "private" {
            format!("👤{info}")
        } else {
            format!("👥{info}")
        };

        let mut entry = Callback {
            category: "link".to_string(),
            query: callback.query.clone(),
            page: pager.current_page,
            ..Default::default()
        };

        let existing = links
            .iter()
            .find(|link| link.master_limb == master_limb && link.slave_limb == chat.limb);
        match existing {
            None => {
                entry.action = "bind".to_string();
                entry.data = chat.limb.clone();
            }
            Some(link) => {
                info = format!("🔗{info}");
                entry.action = "unbind".to_string();
                entry.data = link.id.to_string();
            }
        }

        keyboard.push(vec![InlineKeyboardButton::callback(
            info,
            ctx.callbacks.put(entry),
        )]);
    }
    keyboard.push(navigation_row(ctx, "link", &callback, &pager));

    deliver_keyboard(bot, &origin, text, InlineKeyboardMarkup::new(keyboard)).await
}

async fn show_chats(
    bot: &Bot,
    ctx: &MasterContext,
    origin: Origin,
    callback: Callback,
) -> Result<(), MasterError> {
    let count = ctx.store.chat_count(&callback.query)?;
    let pager = calc_pager(callback.page, ctx.config.master.page_size, count);
    let chats = ctx
        .store
        .chat_list(pager.current_page, ctx.config.master.page_size, &callback.query)?;

    if chats.is_empty() {
        let mut request = bot.send_message(origin.chat_id, "No chat currently available.");
        if let Some(thread_id) = origin.thread_id {
            request = request.message_thread_id(thread_id);
        }
        request.await?;
        return Ok(());
    }

    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for chat in &chats {
        let Ok(limb) = chat.limb.parse::<Limb>() else {
            continue;
        };
        let mut info = format!("{}({}) from ({} {})", chat.title, limb.chat_id, limb.kind, limb.uid);
        info = if chat.chat_type == "private" {
            format!("👤{info}")
        } else {
            format!("👥{info}")
        };

        let entry = Callback {
            category: "chat".to_string(),
            action: "talk".to_string(),
            data: chat.limb.clone(),
            query: callback.query.clone(),
            page: pager.current_page,
        };
        keyboard.push(vec![InlineKeyboardButton::callback(
            info,
            ctx.callbacks.put(entry),
        )]);
    }
    keyboard.push(navigation_row(ctx, "chat", &callback, &pager));

    deliver_keyboard(
        bot,
        &origin,
        "Please choose a chat you'd like to talk.".to_string(),
        InlineKeyboardMarkup::new(keyboard),
    )
    .await
}

fn navigation_row(
    ctx: &MasterContext,
    category: &str,
    callback: &Callback,
    pager: &hydra_store::Pager,
) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::new();

    if pager.has_prev {
        let mut prev = Callback::list(category, &callback.query);
        prev.page = pager.prev_page;
        row.push(InlineKeyboardButton::callback(
            "< Prev",
            ctx.callbacks.put(prev),
        ));
    } else {
        row.push(InlineKeyboardButton::callback(" ", "0"));
    }

    let info = format!(
        "{} / {} ({}) | Cancel",
        pager.current_page, pager.num_pages, pager.num_items
    );
    let close = Callback {
        category: category.to_string(),
        action: "close".to_string(),
        ..Default::default()
    };
    row.push(InlineKeyboardButton::callback(info, ctx.callbacks.put(close)));

    if pager.has_next {
        let mut next = Callback::list(category, &callback.query);
        next.page = pager.next_page;
        row.push(InlineKeyboardButton::callback(
            "Next >",
            ctx.callbacks.put(next),
        ));
    } else {
        row.push(InlineKeyboardButton::callback(" ", "0"));
    }

    row
}

async fn deliver_keyboard(
    bot: &Bot,
    origin: &Origin,
    text: String,
    markup: InlineKeyboardMarkup,
) -> Result<(), MasterError> {
    match origin.message_id {
        Some(message_id) => {
            bot.edit_message_text(origin.chat_id, message_id, text)
                .reply_markup(markup)
                .await?;
        }
        None => {
            let mut request = bot.send_message(origin.chat_id, text).reply_markup(markup);
            if let Some(thread_id) = origin.thread_id {
                request = request.message_thread_id(thread_id);
            }
            request.await?;
        }
    }
    Ok(())
}
