//! Telegram → slave transfer: route the admin's message to a slave chat,
//! translate it into a unified event, and enqueue it on the m→s bus.

use std::sync::Arc;

use teloxide::net::Download;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode, ReplyParameters};
use tracing::{debug, warn};

use hydra_core::media::{extension_for, sniff_mime};
use hydra_core::types::{
    BlobData, Chat, Event, EventData, EventKind, Limb, LocationData, ReplyInfo, User,
};
use hydra_store::NewMessage;

use crate::command::chat_is_forum;
use crate::error::MasterError;
use crate::service::MasterContext;
use crate::text::escape_markdown;

/// Route a non-command admin message to its slave chat.
pub(crate) async fn process_master_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<MasterContext>,
) -> Result<(), MasterError> {
    let master_limb = ctx.master_limb(msg.chat.id);
    debug!(chat = %msg.chat.id, msg = msg.id.0, "telegram message received");

    if chat_is_forum(&msg.chat) {
        let Some(thread_id) = msg.thread_id else {
            return reply_link_issue(bot, msg, "*Chat on default topic not allowed.*").await;
        };
        return match ctx
            .store
            .topic_by_master(&master_limb, i64::from(thread_id.0 .0))?
        {
            Some(topic) => transfer_master_message(bot, msg, ctx, &topic.slave_limb).await,
            None => reply_link_issue(bot, msg, "*No linked chat on topic found.*").await,
        };
    }

    if msg.chat.is_group() || msg.chat.is_supergroup() {
        let links = ctx.store.links_by_master(&master_limb)?;
        return match links.as_slice() {
            [] => reply_link_issue(bot, msg, "*No linked chat on group found.*").await,
            [link] => transfer_master_message(bot, msg, ctx, &link.slave_limb).await,
            _ => reply_link_issue(bot, msg, "*Multiple linked chat found.*").await,
        };
    }

    if let Some(replied) = msg.reply_to_message() {
        return match ctx
            .store
            .message_by_master(&master_limb, &replied.id.0.to_string())?
        {
            Some(row) => transfer_master_message(bot, msg, ctx, &row.slave_limb).await,
            None => reply_link_issue(bot, msg, "*No linked chat by reply found.*").await,
        };
    }

    reply_link_issue(bot, msg, "*No linked chat found.*").await
}

/// Build the unified event for `msg` and push it onto the m→s bus. The
/// attached callback persists the identity row once the vendor acks, or
/// surfaces the failure as a Telegram reply.
async fn transfer_master_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<MasterContext>,
    slave_limb: &str,
) -> Result<(), MasterError> {
    let chat = ctx
        .store
        .get_chat(slave_limb)?
        .ok_or_else(|| MasterError::ChatUnknown(slave_limb.to_string()))?;

    let limb: Limb = slave_limb.parse()?;
    let me_limb = Limb::new(limb.kind.clone(), limb.uid.clone(), limb.uid.clone());
    let me = ctx
        .store
        .get_chat(&me_limb.to_string())?
        .ok_or_else(|| MasterError::ChatUnknown(me_limb.to_string()))?;

    let mut event = Event {
        vendor: limb.vendor(),
        id: msg.id.0.to_string(),
        timestamp: msg.date.timestamp(),
        from: User {
            id: limb.uid.clone(),
            username: me.title.clone(),
            remark: me.title.clone(),
        },
        chat: Chat {
            id: limb.chat_id.clone(),
            kind: chat.chat_type.clone(),
            title: chat.title.clone(),
        },
        kind: EventKind::Text,
        content: msg.text().or(msg.caption()).unwrap_or("").to_string(),
        ..Default::default()
    };

    attach_reply_context(msg, ctx, &mut event)?;
    attach_media(bot, msg, ctx, &mut event).await?;

    let callback_bot = bot.clone();
    let callback_ctx = Arc::clone(ctx);
    let raw_chat_id = msg.chat.id;
    let raw_msg_id = msg.id;
    let raw_thread_id = msg.thread_id;
    event.callback = Some(Box::new(move |result| match result {
        Ok(ack) => {
            let row = NewMessage {
                master_limb: callback_ctx.master_limb(raw_chat_id),
                master_msg_id: raw_msg_id.0.to_string(),
                master_msg_thread_id: raw_thread_id
                    .map(|thread_id| thread_id.0 .0.to_string())
                    .unwrap_or_else(|| "0".to_string()),
                slave_limb: Limb::of(&ack.vendor, ack.chat.id.clone()).to_string(),
                slave_msg_id: ack.id.clone(),
                slave_sender: ack.from.id.clone(),
                content: ack.content.clone(),
                timestamp: ack.timestamp,
            };
            if let Err(e) = callback_ctx.store.add_message(&row) {
                warn!(error = %e, "failed to add message row");
            } else {
                debug!(?row, "message row added");
            }
        }
        Err(e) => {
            let text = format!("*[FAIL]: {}*", escape_markdown(&e.to_string()));
            tokio::spawn(async move {
                let mut request = callback_bot
                    .send_message(raw_chat_id, text)
                    .parse_mode(ParseMode::Markdown)
                    .reply_parameters(ReplyParameters::new(raw_msg_id));
                if let Some(thread_id) = raw_thread_id {
                    request = request.message_thread_id(thread_id);
                }
                if let Err(e) = request.await {
                    warn!(error = %e, "failed to send failure reply");
                }
            });
        }
    }));

    if ctx.out.send(event).await.is_err() {
        warn!("master→slave bus is closed");
    }
    Ok(())
}

/// Attach the quoted-message handle when the replied-to Telegram message
/// maps to a persisted row with a real slave id. Replies to the topic root
/// are implicit and ignored.
fn attach_reply_context(
    msg: &Message,
    ctx: &Arc<MasterContext>,
    event: &mut Event,
) -> Result<(), MasterError> {
    let Some(replied) = msg.reply_to_message() else {
        return Ok(());
    };
    if replied
        .thread_id
        .map(|thread_id| thread_id.0 == replied.id)
        .unwrap_or(false)
    {
        return Ok(());
    }

    let master_limb = ctx.master_limb(msg.chat.id);
    if let Some(row) = ctx
        .store
        .message_by_master(&master_limb, &replied.id.0.to_string())?
    {
        if row.slave_msg_id != "0" {
            event.reply = Some(ReplyInfo {
                id: row.slave_msg_id,
                timestamp: row.timestamp,
                sender: row.slave_sender,
                content: row.content,
            });
        }
    }
    Ok(())
}

/// Translate Telegram media into the unified payload, downloading the
/// binary into memory.
async fn attach_media(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<MasterContext>,
    event: &mut Event,
) -> Result<(), MasterError> {
    if let Some(photos) = msg.photo() {
        // highest resolution comes last
        if let Some(photo) = photos.last() {
            event.kind = EventKind::Photo;
            let blob = download(bot, ctx, &photo.file.id).await?;
            event.data = Some(EventData::Photo(vec![blob]));
        }
        return Ok(());
    }
    if let Some(sticker) = msg.sticker() {
        event.kind = EventKind::Photo;
        let blob = download(bot, ctx, &sticker.file.id).await?;
        event.data = Some(EventData::Photo(vec![blob]));
        return Ok(());
    }
    if let Some(animation) = msg.animation() {
        event.kind = EventKind::Photo;
        let blob = download(bot, ctx, &animation.file.id).await?;
        event.data = Some(EventData::Photo(vec![blob]));
        return Ok(());
    }
    if let Some(voice) = msg.voice() {
        event.kind = EventKind::Audio;
        let blob = download(bot, ctx, &voice.file.id).await?;
        event.data = Some(EventData::Blob(blob));
        return Ok(());
    }
    if let Some(audio) = msg.audio() {
        event.kind = EventKind::Audio;
        let mut blob = download(bot, ctx, &audio.file.id).await?;
        if let Some(file_name) = &audio.file_name {
            blob.name = file_name.clone();
        }
        event.data = Some(EventData::Blob(blob));
        return Ok(());
    }
    if let Some(video) = msg.video() {
        event.kind = EventKind::Video;
        let mut blob = download(bot, ctx, &video.file.id).await?;
        if let Some(file_name) = &video.file_name {
            blob.name = file_name.clone();
        }
        event.data = Some(EventData::Blob(blob));
        return Ok(());
    }
    if let Some(document) = msg.document() {
        event.kind = EventKind::File;
        let mut blob = download(bot, ctx, &document.file.id).await?;
        if let Some(file_name) = &document.file_name {
            blob.name = file_name.clone();
        }
        event.data = Some(EventData::Blob(blob));
        return Ok(());
    }
    if let Some(location) = msg.location() {
        event.kind = EventKind::Location;
        event.data = Some(EventData::Location(LocationData {
            name: "Location".to_string(),
            address: format!(
                "Latitude: {:.5} Longitude: {:.5}",
                location.latitude, location.longitude
            ),
            longitude: location.longitude,
            latitude: location.latitude,
        }));
        return Ok(());
    }
    if let Some(venue) = msg.venue() {
        event.kind = EventKind::Location;
        event.data = Some(EventData::Location(LocationData {
            name: venue.title.clone(),
            address: venue.address.clone(),
            longitude: venue.location.longitude,
            latitude: venue.location.latitude,
        }));
        return Ok(());
    }
    if event.content.is_empty() {
        return Err(MasterError::UnsupportedMessage);
    }
    Ok(())
}

/// Fetch a Telegram file into memory; local mode reads straight from disk.
async fn download(
    bot: &Bot,
    ctx: &Arc<MasterContext>,
    file_id: &str,
) -> Result<BlobData, MasterError> {
    let file = bot.get_file(file_id).await?;

    let data = if ctx.config.master.local_mode {
        tokio::fs::read(&file.path)
            .await
            .map_err(|e| MasterError::Download(e.to_string()))?
    } else {
        let mut buf: Vec<u8> = Vec::new();
        bot.download_file(&file.path, &mut buf)
            .await
            .map_err(|e| MasterError::Download(e.to_string()))?;
        buf
    };

    let mime = sniff_mime(&data);
    Ok(BlobData {
        name: format!("{}{}", file.unique_id, extension_for(mime)),
        mime: mime.to_string(),
        binary: data,
    })
}

async fn reply_link_issue(bot: &Bot, msg: &Message, text: &str) -> Result<(), MasterError> {
    let mut request = bot
        .send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_parameters(ReplyParameters::new(msg.id));
    if let Some(thread_id) = msg.thread_id {
        request = request.message_thread_id(thread_id);
    }
    request.await?;
    Ok(())
}
