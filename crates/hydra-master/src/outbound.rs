//! Slave → Telegram rendering: consume the s→m bus, resolve destinations,
//! and project unified events onto Telegram API calls.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, ChatId, InputFile, InputMedia, InputMediaPhoto, MessageId, ParseMode,
    ReplyParameters,
};
use tracing::{debug, info, warn};

use hydra_core::bus::EventSource;
use hydra_core::types::{BlobData, Event, EventData, EventKind, Limb};
use hydra_store::NewMessage;

use crate::service::{MasterContext, MASTER_VENDOR};
use crate::text::{escape_html, escape_markdown, escape_markdown_v2};
use crate::topic::{self, ChatDest};

const IMG_MIN_SIZE: u32 = 1600;
const IMG_MAX_SIZE: u32 = 1200;
const IMG_SIZE_RATIO: f32 = 3.5;
const IMG_SIZE_MAX_RATIO: f32 = 10.0;

/// Media groups cap at ten items; Telegram rejects larger batches.
const MEDIA_GROUP_LIMIT: usize = 10;

/// Dispatcher loop over the s→m bus. Sync and observe traffic bypasses the
/// per-chat mutex; everything else serializes on the source chat.
pub(crate) async fn run(ctx: Arc<MasterContext>, mut source: EventSource) {
    while let Some(event) = source.recv().await {
        match event.kind {
            EventKind::Sync => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { update_chats(&ctx, event) });
            }
            EventKind::Observe => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { notify_admin(&ctx, event).await });
            }
            _ => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let key = event.chat.id.clone();
                    let _guard = ctx.mutex.lock(&key).await;
                    process_slave_event(&ctx, event).await;
                });
            }
        }
    }
}

/// Upsert the chat registry from a vendor roster sync.
fn update_chats(ctx: &Arc<MasterContext>, event: Event) {
    let Some(EventData::Sync(chats)) = &event.data else {
        warn!(vendor = %event.vendor, "sync event without chat roster");
        return;
    };
    info!(vendor = %event.vendor, count = chats.len(), "updating chats");
    for chat in chats {
        let limb = Limb::of(&event.vendor, chat.id.clone()).to_string();
        if let Err(e) = ctx.store.add_or_update_chat(&limb, &chat.kind, &chat.title) {
            warn!(error = %e, limb, "failed to add or update chat");
        }
    }
}

async fn notify_admin(ctx: &Arc<MasterContext>, event: Event) {
    let text = format!("*[INFO]: {}*", escape_markdown(&event.content));
    let admin = ChatId(ctx.config.master.admin_id);
    if let Err(e) = ctx
        .bot
        .send_message(admin, text)
        .parse_mode(ParseMode::Markdown)
        .await
    {
        warn!(error = %e, "failed to notify admin");
    }
}

async fn process_slave_event(ctx: &Arc<MasterContext>, event: Event) {
    debug!(?event, "slave event received");

    let slave_limb = event.slave_limb().to_string();

    let links = match ctx.store.links_by_slave(&slave_limb) {
        Ok(links) => links,
        Err(e) => {
            warn!(error = %e, "get links by slave failed");
            return;
        }
    };

    let reply_map = build_reply_map(ctx, &slave_limb, &event);

    let mut dests: Vec<ChatDest> = Vec::new();
    if !links.is_empty() {
        for link in &links {
            let chat_id = match link
                .master_limb
                .parse::<Limb>()
                .ok()
                .and_then(|limb| limb.chat_id.parse::<i64>().ok())
            {
                Some(chat_id) => chat_id,
                None => {
                    warn!(limb = %link.master_limb, "bad master limb on link");
                    continue;
                }
            };
            match topic::linked_dest(&ctx.bot, ctx, chat_id, &event).await {
                Ok(dest) => dests.push(dest),
                Err(e) => warn!(error = %e, chat_id, "destination resolution failed"),
            }
        }
    } else if let Some(&chat_id) = ctx.archive_chats.get(&event.vendor.to_string()) {
        dests.push(topic::forum_dest(&ctx.bot, ctx, chat_id, &event).await);
    } else {
        dests.push(ChatDest::decorated(
            ChatId(ctx.config.master.admin_id),
            &event,
        ));
    }

    for dest in dests {
        let reply_to = reply_map.get(&dest.id.0).copied();
        render_event(ctx, &dest, &event, reply_to).await;
    }
}

/// All persisted master messages the quoted slave message maps to, keyed
/// by master chat id. Last row per chat wins.
fn build_reply_map(
    ctx: &Arc<MasterContext>,
    slave_limb: &str,
    event: &Event,
) -> HashMap<i64, i64> {
    let mut reply_map = HashMap::new();
    let Some(reply) = &event.reply else {
        return reply_map;
    };

    let rows = match ctx.store.messages_by_slave_reply(slave_limb, reply) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "get reply messages failed");
            return reply_map;
        }
    };
    for row in rows {
        let Ok(limb) = row.master_limb.parse::<Limb>() else {
            warn!(limb = %row.master_limb, "bad master limb on message row");
            continue;
        };
        let (Ok(chat_id), Ok(msg_id)) =
            (limb.chat_id.parse::<i64>(), row.master_msg_id.parse::<i64>())
        else {
            warn!(limb = %row.master_limb, msg = %row.master_msg_id, "bad reply row");
            continue;
        };
        reply_map.insert(chat_id, msg_id);
    }
    reply_map
}

async fn render_event(
    ctx: &Arc<MasterContext>,
    dest: &ChatDest,
    event: &Event,
    reply_to: Option<i64>,
) {
    let bot = &ctx.bot;

    macro_rules! finish {
        ($request:expr) => {{
            let mut request = $request;
            if let Some(thread_id) = dest.thread_id {
                request = request.message_thread_id(thread_id);
            }
            if let Some(msg_id) = reply_to {
                request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
            }
            match request.await {
                Ok(message) => log_message(ctx, event, &message),
                Err(e) => warn!(error = %e, chat = dest.id.0, "failed to send to telegram"),
            }
        }};
    }

    match event.kind {
        EventKind::Revoke => {
            chat_action(ctx, dest, ChatAction::Typing).await;
            let text = format!(
                "{}\n~{}~",
                escape_markdown_v2(&dest.title),
                escape_markdown_v2(&event.content)
            );
            finish!(bot
                .send_message(dest.id, text)
                .parse_mode(ParseMode::MarkdownV2));
        }
        EventKind::Text | EventKind::System => {
            chat_action(ctx, dest, ChatAction::Typing).await;
            let text = format!("{}\n{}", dest.title, event.content);
            finish!(bot.send_message(dest.id, text));
        }
        EventKind::Voip => {
            chat_action(ctx, dest, ChatAction::Typing).await;
            let text = format!(
                "{}\n_{}_",
                escape_markdown_v2(&dest.title),
                escape_markdown_v2(&event.content)
            );
            finish!(bot
                .send_message(dest.id, text)
                .parse_mode(ParseMode::MarkdownV2));
        }
        EventKind::Location => {
            let Some(EventData::Location(location)) = &event.data else {
                warn!("location event without location data");
                return;
            };
            let title = format!("{}\n{}", dest.title, location.name);
            finish!(bot.send_venue(
                dest.id,
                location.latitude,
                location.longitude,
                title,
                location.address.clone(),
            ));
        }
        EventKind::App => {
            let Some(EventData::App(app)) = &event.data else {
                warn!("app event without app data");
                return;
            };
            let mut text = format!(
                "{}\n<u>{}</u>\n\n{}",
                dest.title,
                escape_html(&app.title),
                escape_html(&app.description)
            );
            if !app.url.is_empty() {
                let source = if app.source.is_empty() {
                    app.url.clone()
                } else {
                    escape_html(&app.source)
                };
                text = format!("{}\n\nvia <a href=\"{}\">{}</a>", text, app.url, source);
            }
            chat_action(ctx, dest, ChatAction::Typing).await;
            finish!(bot.send_message(dest.id, text).parse_mode(ParseMode::Html));
        }
        EventKind::Audio => {
            let Some(EventData::Blob(blob)) = &event.data else {
                warn!("audio event without blob");
                return;
            };
            chat_action(ctx, dest, ChatAction::UploadVoice).await;
            let voice = InputFile::memory(blob.binary.clone()).file_name(blob.name.clone());
            finish!(bot.send_voice(dest.id, voice).caption(dest.title.clone()));
        }
        EventKind::Video => {
            let Some(EventData::Blob(blob)) = &event.data else {
                warn!("video event without blob");
                return;
            };
            chat_action(ctx, dest, ChatAction::UploadVideo).await;
            let text = format!("{}\n{}", dest.title, event.content);
            let video = InputFile::memory(blob.binary.clone()).file_name(blob.name.clone());
            finish!(bot.send_video(dest.id, video).caption(text));
        }
        EventKind::File => {
            let Some(EventData::Blob(blob)) = &event.data else {
                warn!("file event without blob");
                return;
            };
            chat_action(ctx, dest, ChatAction::UploadDocument).await;
            let document = InputFile::memory(blob.binary.clone()).file_name(blob.name.clone());
            finish!(bot
                .send_document(dest.id, document)
                .caption(dest.title.clone()));
        }
        EventKind::Photo => {
            let Some(EventData::Photo(photos)) = &event.data else {
                warn!("photo event without blobs");
                return;
            };
            render_photos(ctx, dest, event, reply_to, photos).await;
        }
        EventKind::Sticker => {
            // converted stickers arrive as a single image blob
            let Some(EventData::Blob(blob)) = &event.data else {
                warn!("sticker event without blob");
                return;
            };
            render_photos(ctx, dest, event, reply_to, std::slice::from_ref(blob)).await;
        }
        other => warn!(kind = %other, "event kind not supported"),
    }
}

async fn render_photos(
    ctx: &Arc<MasterContext>,
    dest: &ChatDest,
    event: &Event,
    reply_to: Option<i64>,
    photos: &[BlobData],
) {
    let bot = &ctx.bot;
    let text = format!("{}\n{}", dest.title, event.content);

    macro_rules! finish {
        ($request:expr) => {{
            let mut request = $request;
            if let Some(thread_id) = dest.thread_id {
                request = request.message_thread_id(thread_id);
            }
            if let Some(msg_id) = reply_to {
                request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
            }
            match request.await {
                Ok(message) => log_message(ctx, event, &message),
                Err(e) => warn!(error = %e, chat = dest.id.0, "failed to send to telegram"),
            }
        }};
    }

    match photos {
        [] => {}
        [photo] => {
            chat_action(ctx, dest, ChatAction::UploadPhoto).await;
            if photo.mime == "image/gif" {
                let file = InputFile::memory(photo.binary.clone())
                    .file_name(format!("{}.gif", photo.name));
                finish!(bot.send_animation(dest.id, file).caption(text.clone()));
            } else if send_as_file(&photo.binary) {
                let file =
                    InputFile::memory(photo.binary.clone()).file_name(photo.name.clone());
                finish!(bot.send_document(dest.id, file).caption(text.clone()));
            } else {
                let file =
                    InputFile::memory(photo.binary.clone()).file_name(photo.name.clone());
                finish!(bot.send_photo(dest.id, file).caption(text.clone()));
            }
        }
        _ => {
            let mut group: Vec<InputMedia> = Vec::new();
            for (index, photo) in photos.iter().take(MEDIA_GROUP_LIMIT).enumerate() {
                let file =
                    InputFile::memory(photo.binary.clone()).file_name(photo.name.clone());
                let mut media = InputMediaPhoto::new(file);
                if index == 0 {
                    media = media.caption(text.clone());
                }
                group.push(InputMedia::Photo(media));
            }

            let mut request = bot.send_media_group(dest.id, group);
            if let Some(thread_id) = dest.thread_id {
                request = request.message_thread_id(thread_id);
            }
            if let Some(msg_id) = reply_to {
                request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
            }
            match request.await {
                Ok(messages) => {
                    for message in &messages {
                        log_message(ctx, event, message);
                    }
                }
                Err(e) => warn!(error = %e, chat = dest.id.0, "failed to send media group"),
            }
        }
    }
}

async fn chat_action(ctx: &Arc<MasterContext>, dest: &ChatDest, action: ChatAction) {
    let mut request = ctx.bot.send_chat_action(dest.id, action);
    if let Some(thread_id) = dest.thread_id {
        request = request.message_thread_id(thread_id);
    }
    let _ = request.await;
}

/// Persist one identity row per produced Telegram message. Failures are
/// logged and do not abort the send.
fn log_message(ctx: &Arc<MasterContext>, event: &Event, message: &teloxide::types::Message) {
    let master_limb = Limb::new(
        MASTER_VENDOR,
        ctx.config.master.admin_id.to_string(),
        message.chat.id.0.to_string(),
    );
    let row = NewMessage {
        master_limb: master_limb.to_string(),
        master_msg_id: message.id.0.to_string(),
        master_msg_thread_id: message
            .thread_id
            .map(|thread_id| thread_id.0 .0.to_string())
            .unwrap_or_else(|| "0".to_string()),
        slave_limb: event.slave_limb().to_string(),
        slave_msg_id: event.id.clone(),
        slave_sender: event.from.id.clone(),
        content: event.content.clone(),
        timestamp: event.timestamp,
    };
    if let Err(e) = ctx.store.add_message(&row) {
        warn!(error = %e, ?row, "failed to add message row");
    } else {
        debug!(?row, "message row added");
    }
}

/// Oversized or extreme-ratio images are delivered as documents so Telegram
/// does not recompress them into mush.
fn send_as_file(data: &[u8]) -> bool {
    let Some((width, height)) = image_dimensions(data) else {
        return false;
    };
    dimensions_need_file(width, height)
}

fn dimensions_need_file(width: u32, height: u32) -> bool {
    let (max_size, min_size) = if height > width {
        (height, width)
    } else {
        (width, height)
    };
    if min_size == 0 {
        return false;
    }
    let ratio = max_size as f32 / min_size as f32;

    min_size > IMG_MIN_SIZE
        || (max_size > IMG_MAX_SIZE && ratio > IMG_SIZE_RATIO)
        || ratio >= IMG_SIZE_MAX_RATIO
}

fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
