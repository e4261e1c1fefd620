//! Update handlers registered in the teloxide dispatcher.

use std::sync::Arc;

use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::MessageEntityKind;
use tracing::warn;

use crate::command;
use crate::service::MasterContext;

/// Every incoming message runs through here.
///
/// 1. Ignore bot messages.
/// 2. Ignore anyone but the configured admin.
/// 3. Route commands to the command handler, everything else into the
///    master→slave transfer path.
pub(crate) async fn on_message(
    bot: Bot,
    msg: Message,
    ctx: Arc<MasterContext>,
) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }
    if from.id.0 != ctx.config.master.admin_id as u64 {
        return Ok(());
    }

    if is_command(&msg) {
        if let Err(e) = command::handle_command(&bot, &msg, &ctx).await {
            warn!(error = %e, "command handling failed");
        }
        return Ok(());
    }

    if let Err(e) = crate::inbound::process_master_message(&bot, &msg, &ctx).await {
        warn!(error = %e, "master message handling failed");
    }
    Ok(())
}

/// Inline-keyboard callback queries: resolve the hash through the ephemeral
/// callback map and re-enter the command flows.
pub(crate) async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    ctx: Arc<MasterContext>,
) -> ResponseResult<()> {
    let callback = query
        .data
        .as_deref()
        .and_then(|hash| ctx.callbacks.get(hash));

    let Some(callback) = callback else {
        // Map is rebuilt on restart; stale keyboards land here.
        bot.answer_callback_query(query.id)
            .text("Unknown callback.")
            .await?;
        return Ok(());
    };
    bot.answer_callback_query(query.id.clone()).await?;

    let Some(message) = query.message.as_ref().and_then(|m| m.regular_message()) else {
        return Ok(());
    };

    let result = match callback.category.as_str() {
        "link" => {
            command::handle_link(
                &bot,
                &ctx,
                query.from.id.0 as i64,
                command::Origin::callback(message),
                callback,
            )
            .await
        }
        "chat" => {
            command::handle_chat(
                &bot,
                &ctx,
                query.from.id.0 as i64,
                command::Origin::callback(message),
                callback,
            )
            .await
        }
        other => {
            warn!(category = other, "invalid callback category");
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!(error = %e, "callback handling failed");
    }
    Ok(())
}

/// A command is a message whose first entity is a `bot_command` at offset 0.
pub(crate) fn is_command(msg: &Message) -> bool {
    msg.entities()
        .and_then(|entities| entities.first())
        .map(|entity| entity.offset == 0 && entity.kind == MessageEntityKind::BotCommand)
        .unwrap_or(false)
}
