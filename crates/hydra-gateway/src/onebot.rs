//! OneBot client: segment-based protocol over one WebSocket connection.
//!
//! Inbound frames are classified by their discriminating field and message
//! segments are composed into unified events; outbound events are projected
//! onto `send_msg` requests with base64-inlined media. Requests correlate
//! with responses through the `echo` field.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use hydra_core::bus::EventSink;
use hydra_core::media::sniff_mime;
use hydra_core::mutex::KeyMutex;
use hydra_core::types::{
    AppData, BlobData, Chat, Event, EventData, EventKind, LocationData, ReplyInfo, User, Vendor,
    REMOTE_PREFIX,
};
use hydra_core::BridgeError;
use hydra_onebot::{
    kind as seg, parse_payload, ActionRequest, ActionResponse, FileInfo, FriendInfo,
    FriendRecallEvent, GroupInfo, GroupRecallEvent, MessageEvent, OfflineFileEvent, OnebotEvent,
    Payload, Segment, Sender,
};

use crate::client::{Client, GOODBYE_CLOSE};

const MEDIA_RETRIES: usize = 3;
const MEDIA_RETRY_DELAY: Duration = Duration::from_secs(3);
const ROSTER_REFRESH_DELAY: Duration = Duration::from_secs(60);
const CLOSE_DEADLINE: Duration = Duration::from_secs(3);

enum MediaFetch {
    Record,
    Image,
    File,
}

pub struct OnebotClient {
    vendor: Vendor,
    send_timeout: Duration,
    writer: Mutex<SplitSink<WebSocket, Message>>,
    /// Sink of the slave→master bus.
    out: EventSink,
    http: reqwest::Client,
    /// Pending response waiters keyed by echo.
    waiters: DashMap<String, oneshot::Sender<ActionResponse>>,
    echo: AtomicI64,
    /// Serializes event handling per conversation.
    mutex: KeyMutex,
    self_info: RwLock<Option<FriendInfo>>,
    friends: RwLock<HashMap<i64, FriendInfo>>,
    groups: RwLock<HashMap<i64, GroupInfo>>,
}

impl OnebotClient {
    pub fn new(
        vendor: Vendor,
        send_timeout: Duration,
        writer: SplitSink<WebSocket, Message>,
        out: EventSink,
        http: reqwest::Client,
    ) -> Self {
        Self {
            vendor,
            send_timeout,
            writer: Mutex::new(writer),
            out,
            http,
            waiters: DashMap::new(),
            echo: AtomicI64::new(0),
            mutex: KeyMutex::with_locks(47),
            self_info: RwLock::new(None),
            friends: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Read frames until error, EOF, or peer close.
    pub async fn run(self: &Arc<Self>, mut reader: SplitStream<WebSocket>) {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let value: Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(vendor = %self.vendor, error = %e, "malformed frame, ignoring");
                            continue;
                        }
                    };
                    match parse_payload(value) {
                        Ok(Payload::Request(request)) => {
                            warn!(action = %request.action, "request not supported");
                        }
                        Ok(Payload::Response(response)) => self.deliver(response),
                        Ok(Payload::Event(event)) => {
                            let client = Arc::clone(self);
                            tokio::spawn(async move { client.process_event(event).await });
                        }
                        Err(e) => warn!(vendor = %self.vendor, error = %e, "failed to classify payload"),
                    }
                }
                Ok(Message::Ping(data)) => {
                    let mut writer = self.writer.lock().await;
                    let _ = writer.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(vendor = %self.vendor, error = %e, "error reading from websocket");
                    break;
                }
            }
        }
    }

    fn deliver(&self, response: ActionResponse) {
        debug!(echo = %response.echo, "response received");
        match self.waiters.remove(&response.echo) {
            Some((_, waiter)) => {
                let echo = response.echo.clone();
                if waiter.send(response).is_err() {
                    warn!(echo, "response waiter is gone");
                }
            }
            None => warn!(echo = %response.echo, "dropping response to unknown echo"),
        }
    }

    async fn process_event(self: Arc<Self>, event: OnebotEvent) {
        let key = event_key(&event);
        let _guard = self.mutex.lock(&key).await;

        match event {
            OnebotEvent::Message(message) => self.process_message_event(message).await,
            OnebotEvent::Lifecycle(lifecycle) => {
                if lifecycle.sub_type == "connect" {
                    let client = Arc::clone(&self);
                    tokio::spawn(async move {
                        tokio::time::sleep(ROSTER_REFRESH_DELAY).await;
                        client.update_chats().await;
                    });
                }
            }
            OnebotEvent::Heartbeat(heartbeat) => {
                debug!(status = ?heartbeat.status, "heartbeat received");
            }
            OnebotEvent::GroupRecall(recall) => self.process_group_recall(recall).await,
            OnebotEvent::FriendRecall(recall) => self.process_friend_recall(recall).await,
            OnebotEvent::OfflineFile(file) => self.process_offline_file(file).await,
            OnebotEvent::GroupUpload(file) => self.process_group_upload(file).await,
            OnebotEvent::Other(value) => debug!(payload = ?value, "unhandled event"),
        }
    }

    async fn process_message_event(&self, message: MessageEvent) {
        if message.message.is_empty() {
            return;
        }

        let mut event = self.base_event(message.message_id.to_string(), message.time);
        event.from = User {
            id: message.sender.user_id.to_string(),
            username: message.sender.nickname.clone(),
            remark: message.sender.card.clone(),
        };
        event.chat = if message.is_private() {
            let peer = message.private_peer();
            Chat {
                id: peer.to_string(),
                kind: "private".to_string(),
                title: self.friend_name(peer),
            }
        } else {
            Chat {
                id: message.group_id.to_string(),
                kind: "group".to_string(),
                title: self.group_name(message.group_id),
            }
        };

        self.convert_segments(&mut event, &message.message).await;
        self.push_event(event).await;
    }

    /// Fold a segment list into the unified event: text-ish segments build
    /// the content summary, media segments promote the event kind and fetch
    /// their binaries.
    async fn convert_segments(&self, event: &mut Event, segments: &[Segment]) {
        event.kind = EventKind::Text;

        let mut summary: Vec<String> = Vec::new();
        let mut photos: Vec<BlobData> = Vec::new();

        for segment in segments {
            match segment.kind.as_str() {
                seg::TEXT => summary.push(segment.text_content().to_string()),
                seg::FACE => summary.push(format!("/[Face{}]", segment.face_id())),
                seg::AT => {
                    let mut target_name = segment.at_target().to_string();
                    if event.chat.kind == "group" {
                        if let (Ok(group_id), Ok(member_id)) =
                            (event.chat.id.parse::<i64>(), target_name.parse::<i64>())
                        {
                            if let Ok(member) = self.group_member_info(group_id, member_id).await {
                                let name = member.display_name();
                                if !name.is_empty() {
                                    target_name = name;
                                }
                            }
                        }
                    }
                    summary.push(format!("@{target_name} "));
                }
                seg::IMAGE => {
                    summary.push("[Image]".to_string());
                    let fetched = if segment.url().is_empty() {
                        self.get_media(MediaFetch::Image, segment.media_file()).await
                    } else {
                        self.download_url(segment.url()).await.map(|mut blob| {
                            blob.name = segment.media_file().to_string();
                            blob
                        })
                    };
                    match fetched {
                        Ok(blob) => photos.push(blob),
                        Err(e) => warn!(error = %e, "image download failed"),
                    }
                }
                seg::FILE => match self.get_media(MediaFetch::File, segment.file_id()).await {
                    Ok(blob) => {
                        event.kind = EventKind::File;
                        event.data = Some(EventData::Blob(blob));
                    }
                    Err(e) => {
                        warn!(error = %e, "file download failed");
                        event.content = "[File download failed]".to_string();
                    }
                },
                seg::RECORD => match self.get_media(MediaFetch::Record, segment.media_file()).await
                {
                    Ok(blob) => {
                        event.kind = EventKind::Audio;
                        event.data = Some(EventData::Blob(blob));
                    }
                    Err(e) => {
                        warn!(error = %e, "voice download failed");
                        event.content = "[Voice download failed]".to_string();
                    }
                },
                seg::VIDEO => match self.get_media(MediaFetch::File, segment.file_id()).await {
                    Ok(blob) => {
                        event.kind = EventKind::Video;
                        event.data = Some(EventData::Blob(blob));
                    }
                    Err(e) => {
                        warn!(error = %e, "video download failed");
                        event.content = "[Video download failed]".to_string();
                    }
                },
                seg::REPLY => {
                    // timestamp 0: the router resolves by exact id match
                    event.reply = Some(ReplyInfo {
                        id: segment.reply_id().to_string(),
                        timestamp: 0,
                        ..Default::default()
                    });
                }
                seg::FORWARD => {
                    event.kind = EventKind::App;
                    let app = self.convert_forward(segment.forward_id()).await;
                    event.data = Some(EventData::App(Box::new(app)));
                }
                seg::JSON => {
                    if let Some((kind, data)) = decode_json_segment(segment.json_content()) {
                        event.kind = kind;
                        event.data = Some(data);
                    }
                }
                other => summary.push(format!("[{other}]")),
            }
        }

        if summary.is_empty() {
            return;
        }

        if summary.len() == 1 && segments.len() == 1 && segments[0].is_kind(seg::IMAGE) {
            if segments[0].is_sticker() {
                if let Some(first) = photos.into_iter().next() {
                    event.kind = EventKind::Sticker;
                    event.data = Some(EventData::Blob(first));
                }
            } else {
                event.kind = EventKind::Photo;
                event.data = Some(EventData::Photo(photos));
            }
        } else {
            event.content = summary.concat();
            if !photos.is_empty() {
                event.kind = EventKind::Photo;
                event.data = Some(EventData::Photo(photos));
            }
        }
    }

    async fn process_group_recall(&self, recall: GroupRecallEvent) {
        let mut event = self.synthetic_event();
        let name = match self
            .group_member_info(recall.group_id, recall.operator_id)
            .await
        {
            Ok(member) if !member.display_name().is_empty() => member.display_name(),
            _ => recall.operator_id.to_string(),
        };

        event.from = User {
            id: recall.operator_id.to_string(),
            username: name.clone(),
            remark: name.clone(),
        };
        event.chat = Chat {
            id: recall.group_id.to_string(),
            kind: "group".to_string(),
            title: self.group_name(recall.group_id),
        };
        event.kind = EventKind::Revoke;
        event.content = "recalled a message".to_string();
        event.reply = Some(ReplyInfo {
            id: recall.message_id.to_string(),
            timestamp: 0,
            sender: name,
            ..Default::default()
        });

        self.push_event(event).await;
    }

    async fn process_friend_recall(&self, recall: FriendRecallEvent) {
        let self_id = self.self_info.read().unwrap().as_ref().map(|me| me.user_id);
        if self_id == Some(recall.user_id) {
            info!(message_id = recall.message_id, "own message recalled, nothing to do");
            return;
        }

        let mut event = self.synthetic_event();
        let name = self.friend_name(recall.user_id);
        event.from = User {
            id: recall.user_id.to_string(),
            username: name.clone(),
            remark: name.clone(),
        };
        event.chat = Chat {
            id: recall.user_id.to_string(),
            kind: "private".to_string(),
            title: name.clone(),
        };
        event.kind = EventKind::Revoke;
        event.content = "recalled a message".to_string();
        event.reply = Some(ReplyInfo {
            id: recall.message_id.to_string(),
            timestamp: 0,
            sender: name,
            ..Default::default()
        });

        self.push_event(event).await;
    }

    async fn process_offline_file(&self, notice: OfflineFileEvent) {
        let mut event = self.synthetic_event();
        let name = self.friend_name(notice.user_id);
        event.from = User {
            id: notice.user_id.to_string(),
            username: name.clone(),
            remark: name.clone(),
        };
        event.chat = Chat {
            id: notice.user_id.to_string(),
            kind: "private".to_string(),
            title: name,
        };

        self.attach_notice_file(&mut event, &notice).await;
        self.push_event(event).await;
    }

    async fn process_group_upload(&self, notice: OfflineFileEvent) {
        let mut event = self.synthetic_event();
        let name = match self.group_member_info(notice.group_id, notice.user_id).await {
            Ok(member) if !member.display_name().is_empty() => member.display_name(),
            _ => notice.user_id.to_string(),
        };
        event.from = User {
            id: notice.user_id.to_string(),
            username: name.clone(),
            remark: name,
        };
        event.chat = Chat {
            id: notice.group_id.to_string(),
            kind: "group".to_string(),
            title: self.group_name(notice.group_id),
        };

        self.attach_notice_file(&mut event, &notice).await;
        self.push_event(event).await;
    }

    async fn attach_notice_file(&self, event: &mut Event, notice: &OfflineFileEvent) {
        match self.download_url(&notice.file.url).await {
            Ok(mut blob) => {
                blob.name = notice.file.name.clone();
                event.kind = EventKind::File;
                event.data = Some(EventData::Blob(blob));
            }
            Err(e) => {
                warn!(error = %e, "file download failed");
                event.content = "[File download failed]".to_string();
            }
        }
    }

    /// Flatten a forward bundle (recursively) into a rich card: a plain
    /// summary, an HTML body with blob references, and the blob map.
    async fn convert_forward(&self, id: &str) -> AppData {
        let mut acc = ForwardAcc::default();
        match self.get_forward_messages(id).await {
            Ok(nodes) => self.flatten_forward(0, nodes, &mut acc).await,
            Err(e) => warn!(error = %e, id, "failed to get forward bundle"),
        }

        AppData {
            title: format!("[Chat history {id}]"),
            description: acc.summary.concat(),
            content: acc.content.concat(),
            blobs: acc.blobs,
            ..Default::default()
        }
    }

    fn flatten_forward<'a>(
        &'a self,
        level: usize,
        nodes: Vec<MessageEvent>,
        acc: &'a mut ForwardAcc,
    ) -> BoxFuture<'a, ()> {
        async move {
            acc.summary.push("ForwardMessage:\n".to_string());
            if level > 0 {
                acc.content.push("<blockquote>".to_string());
            }

            for node in nodes {
                let name = {
                    let display = node.sender.display_name();
                    if display.is_empty() {
                        node.sender.user_id.to_string()
                    } else {
                        display
                    }
                };
                acc.summary.push(format!("{name}:\n"));
                acc.content.push(format!("<strong>{name}:</strong><p>"));

                for segment in &node.message {
                    match segment.kind.as_str() {
                        seg::TEXT => {
                            acc.summary.push(segment.text_content().to_string());
                            acc.content.push(segment.text_content().to_string());
                        }
                        seg::FACE => {
                            let face = format!("/[Face{}]", segment.face_id());
                            acc.summary.push(face.clone());
                            acc.content.push(face);
                        }
                        seg::AT => {
                            let at = format!("@{} ", segment.at_target());
                            acc.summary.push(at.clone());
                            acc.content.push(at);
                        }
                        seg::IMAGE => {
                            acc.summary.push("[Image]".to_string());
                            let fetched = if segment.url().is_empty() {
                                self.get_media(MediaFetch::Image, segment.media_file()).await
                            } else {
                                self.download_url(segment.url()).await
                            };
                            match fetched {
                                Ok(mut blob) => {
                                    let file = segment.media_file().to_string();
                                    blob.name = file.clone();
                                    acc.content
                                        .push(format!("<img src=\"{REMOTE_PREFIX}{file}\">"));
                                    acc.blobs.insert(file, blob);
                                }
                                Err(e) => {
                                    warn!(error = %e, "image download failed");
                                    acc.content.push("[Image]".to_string());
                                }
                            }
                        }
                        seg::FORWARD => {
                            match self.get_forward_messages(segment.forward_id()).await {
                                Ok(nested) => {
                                    self.flatten_forward(level + 1, nested, acc).await;
                                }
                                Err(e) => {
                                    warn!(error = %e, id = segment.forward_id(), "failed to get forward bundle");
                                    acc.summary.push("[Forward]".to_string());
                                    acc.content.push("[Forward]".to_string());
                                }
                            }
                        }
                        other => {
                            let placeholder = format!("[{other}]");
                            acc.summary.push(placeholder.clone());
                            acc.content.push(placeholder);
                        }
                    }
                }

                acc.summary.push("\n".to_string());
                acc.content.push("</p>".to_string());
            }

            if level > 0 {
                acc.content.push("</blockquote>".to_string());
            }
        }
        .boxed()
    }

    async fn get_forward_messages(&self, id: &str) -> Result<Vec<MessageEvent>, BridgeError> {
        let data = self.request(ActionRequest::get_forward_msg(id)).await?;
        let nodes = data.get("messages").cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(nodes)?)
    }

    async fn group_member_info(&self, group_id: i64, user_id: i64) -> Result<Sender, BridgeError> {
        let data = self
            .request(ActionRequest::get_group_member_info(group_id, user_id))
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch media through the adapter, retrying a few times before giving
    /// up. Mime is sniffed from the binary.
    async fn get_media(&self, fetch: MediaFetch, file: &str) -> Result<BlobData, BridgeError> {
        let request = match fetch {
            MediaFetch::Record => ActionRequest::get_record(file),
            MediaFetch::Image => ActionRequest::get_image(file),
            MediaFetch::File => ActionRequest::get_file(file),
        };

        let mut last_error = BridgeError::Internal("media fetch not attempted".to_string());
        for attempt in 0..=MEDIA_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(MEDIA_RETRY_DELAY).await;
            }
            match self.try_fetch(request.clone()).await {
                Ok(blob) => return Ok(blob),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    async fn try_fetch(&self, request: ActionRequest) -> Result<BlobData, BridgeError> {
        let data = self.request(request).await?;
        let info: FileInfo = serde_json::from_value(data)?;

        if !info.base64.is_empty() {
            let binary = BASE64
                .decode(&info.base64)
                .map_err(|e| BridgeError::Internal(e.to_string()))?;
            return Ok(BlobData {
                name: info.file_name,
                mime: sniff_mime(&binary).to_string(),
                binary,
            });
        }
        if !info.url.is_empty() {
            let mut blob = self.download_url(&info.url).await?;
            blob.name = info.file_name;
            return Ok(blob);
        }
        Err(BridgeError::Internal(
            "media response carries no payload".to_string(),
        ))
    }

    async fn download_url(&self, url: &str) -> Result<BlobData, BridgeError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        Ok(BlobData {
            name: String::new(),
            mime: sniff_mime(&bytes).to_string(),
            binary: bytes.to_vec(),
        })
    }

    /// Refresh the roster and emit a synthetic sync event with every known
    /// chat.
    async fn update_chats(&self) {
        if let Ok(data) = self.request(ActionRequest::get_friend_list()).await {
            match serde_json::from_value::<Vec<FriendInfo>>(data) {
                Ok(list) => {
                    let mut friends = self.friends.write().unwrap();
                    *friends = list.into_iter().map(|f| (f.user_id, f)).collect();
                }
                Err(e) => warn!(error = %e, "bad friend list"),
            }
        }

        if let Ok(data) = self.request(ActionRequest::get_login_info()).await {
            match serde_json::from_value::<FriendInfo>(data) {
                Ok(me) => {
                    self.friends.write().unwrap().insert(me.user_id, me.clone());
                    *self.self_info.write().unwrap() = Some(me);
                }
                Err(e) => warn!(error = %e, "bad login info"),
            }
        }

        if let Ok(data) = self.request(ActionRequest::get_group_list()).await {
            match serde_json::from_value::<Vec<GroupInfo>>(data) {
                Ok(list) => {
                    let mut groups = self.groups.write().unwrap();
                    *groups = list.into_iter().map(|g| (g.group_id, g)).collect();
                }
                Err(e) => warn!(error = %e, "bad group list"),
            }
        }

        let mut chats: Vec<Chat> = Vec::new();
        for friend in self.friends.read().unwrap().values() {
            chats.push(Chat {
                id: friend.user_id.to_string(),
                kind: "private".to_string(),
                title: friend.display_name(),
            });
        }
        for group in self.groups.read().unwrap().values() {
            chats.push(Chat {
                id: group.group_id.to_string(),
                kind: "group".to_string(),
                title: group.group_name.clone(),
            });
        }

        let mut event = self.base_event("sync".to_string(), chrono::Utc::now().timestamp_millis());
        event.kind = EventKind::Sync;
        event.data = Some(EventData::Sync(chats));
        self.push_event(event).await;
    }

    fn friend_name(&self, user_id: i64) -> String {
        self.friends
            .read()
            .unwrap()
            .get(&user_id)
            .map(|friend| friend.display_name())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user_id.to_string())
    }

    fn group_name(&self, group_id: i64) -> String {
        self.groups
            .read()
            .unwrap()
            .get(&group_id)
            .map(|group| group.group_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| group_id.to_string())
    }

    fn base_event(&self, id: String, timestamp: i64) -> Event {
        Event::new(self.vendor.clone(), id, timestamp)
    }

    /// Notices carry no message id of their own; synthesize one from the
    /// clock like the rest of the adapter ecosystem does.
    fn synthetic_event(&self) -> Event {
        let now = chrono::Utc::now();
        self.base_event(now.timestamp().to_string(), now.timestamp_millis())
    }

    async fn push_event(&self, event: Event) {
        if self.out.send(event).await.is_err() {
            warn!("slave→master bus is closed");
        }
    }

    /// Correlated request/response round-trip; returns the response `data`
    /// payload.
    async fn request(&self, mut request: ActionRequest) -> Result<Value, BridgeError> {
        let echo = (self.echo.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        request.echo = echo.clone();

        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.waiters.insert(echo.clone(), waiter_tx);

        debug!(echo, action = %request.action, "sending request");
        if let Err(e) = self.write(&request).await {
            self.waiters.remove(&echo);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.send_timeout, waiter_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.waiters.remove(&echo);
                return Err(BridgeError::WebsocketClosed);
            }
            Err(_) => {
                self.waiters.remove(&echo);
                return Err(BridgeError::Timeout(self.send_timeout));
            }
        };

        response.into_data().map_err(|e| BridgeError::Remote {
            code: "ONEBOT_ERROR".to_string(),
            message: e.to_string(),
        })
    }

    async fn write(&self, request: &ActionRequest) -> Result<(), BridgeError> {
        let json = serde_json::to_string(request)?;
        let mut writer = self.writer.lock().await;
        tokio::time::timeout(self.send_timeout, writer.send(Message::Text(json.into())))
            .await
            .map_err(|_| BridgeError::Timeout(self.send_timeout))?
            .map_err(|_| BridgeError::WebsocketNotConnected)
    }
}

#[async_trait]
impl Client for OnebotClient {
    fn vendor(&self) -> String {
        self.vendor.to_string()
    }

    async fn send_event(&self, event: &Event) -> Result<Event, BridgeError> {
        debug!(?event, "outbound event received");

        let target: i64 = event
            .chat
            .id
            .parse()
            .map_err(|_| BridgeError::Internal(format!("chat id {} invalid", event.chat.id)))?;

        let mut segments: Vec<Segment> = Vec::new();
        if let Some(reply) = &event.reply {
            segments.push(Segment::reply(&reply.id));
        }

        match event.kind {
            EventKind::Text => segments.push(Segment::text(&event.content)),
            EventKind::Photo => {
                let photos = event
                    .data
                    .as_ref()
                    .and_then(|data| data.as_photos())
                    .ok_or_else(|| BridgeError::Internal("photo event without blobs".to_string()))?;
                for photo in photos {
                    segments.push(Segment::image(&inline_binary(photo)));
                }
            }
            EventKind::Sticker => {
                let blob = require_blob(event)?;
                segments.push(Segment::image(&inline_binary(blob)));
            }
            EventKind::Video => {
                let blob = require_blob(event)?;
                segments.push(Segment::video(&inline_binary(blob)));
            }
            EventKind::Audio => {
                let blob = require_blob(event)?;
                segments.push(Segment::record(&inline_binary(blob)));
            }
            EventKind::File => {
                let blob = require_blob(event)?;
                segments.push(Segment::file(&inline_binary(blob), &blob.name));
            }
            EventKind::Location => {
                let Some(EventData::Location(location)) = &event.data else {
                    return Err(BridgeError::Internal(
                        "location event without location data".to_string(),
                    ));
                };
                segments.push(Segment::json(&location_share_json(location)));
            }
            other => return Err(BridgeError::UnsupportedEvent(other.to_string())),
        }

        let request = if event.chat.kind == "private" {
            ActionRequest::private_msg(target, segments)
        } else {
            ActionRequest::group_msg(target, segments)
        };

        let data = self.request(request).await?;
        let message_id = data
            .get("message_id")
            .and_then(|id| id.as_i64().or_else(|| id.as_f64().map(|f| f as i64)))
            .ok_or_else(|| {
                BridgeError::Internal("send_msg response missing message_id".to_string())
            })?;

        Ok(Event::new(
            event.vendor.clone(),
            message_id.to_string(),
            chrono::Utc::now().timestamp(),
        ))
    }

    async fn dispose(&self) {
        let close = Message::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: GOODBYE_CLOSE.into(),
        }));
        let mut writer = self.writer.lock().await;
        if tokio::time::timeout(CLOSE_DEADLINE, writer.send(close))
            .await
            .is_err()
        {
            warn!(vendor = %self.vendor, "goodbye close frame timed out");
        }
    }
}

#[derive(Default)]
struct ForwardAcc {
    summary: Vec<String>,
    content: Vec<String>,
    blobs: HashMap<String, BlobData>,
}

fn require_blob(event: &Event) -> Result<&BlobData, BridgeError> {
    event
        .data
        .as_ref()
        .and_then(|data| data.as_blob())
        .ok_or_else(|| BridgeError::Internal(format!("{} event without blob", event.kind)))
}

fn inline_binary(blob: &BlobData) -> String {
    format!("base64://{}", BASE64.encode(&blob.binary))
}

/// The per-conversation serialization key: the group for group events, the
/// peer for private ones (the *target* for self-sent messages).
fn event_key(event: &OnebotEvent) -> String {
    match event {
        OnebotEvent::Message(message) if message.is_private() => {
            message.private_peer().to_string()
        }
        OnebotEvent::Message(message) => message.group_id.to_string(),
        OnebotEvent::GroupRecall(recall) => recall.group_id.to_string(),
        OnebotEvent::FriendRecall(recall) => recall.user_id.to_string(),
        OnebotEvent::OfflineFile(notice) => notice.user_id.to_string(),
        OnebotEvent::GroupUpload(notice) => notice.group_id.to_string(),
        _ => String::new(),
    }
}

/// Decode a json segment payload: a map location share becomes a location
/// event; payloads carrying `qqdocurl` or `jumpUrl` become rich cards.
fn decode_json_segment(content: &str) -> Option<(EventKind, EventData)> {
    let value: Value = serde_json::from_str(content).ok()?;
    let meta = value.get("meta");

    if value.get("view").and_then(Value::as_str) == Some("LocationShare") {
        let location = LocationData {
            name: meta_str(meta, "name"),
            address: meta_str(meta, "address"),
            latitude: meta_f64(meta, "lat"),
            longitude: meta_f64(meta, "lng"),
        };
        return Some((EventKind::Location, EventData::Location(location)));
    }

    let prompt = value
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let qqdoc_url = meta_str(meta, "qqdocurl");
    if !qqdoc_url.is_empty() {
        let app = AppData {
            title: prompt,
            description: meta_str(meta, "desc"),
            source: meta_str(meta, "title"),
            url: qqdoc_url,
            ..Default::default()
        };
        return Some((EventKind::App, EventData::App(Box::new(app))));
    }

    let jump_url = meta_str(meta, "jumpUrl");
    if !jump_url.is_empty() {
        let app = AppData {
            title: prompt,
            description: meta_str(meta, "desc"),
            source: meta_str(meta, "tag"),
            url: jump_url,
            ..Default::default()
        };
        return Some((EventKind::App, EventData::App(Box::new(app))));
    }

    None
}

/// Look a key up across every entry of the `meta` object (the entry name
/// varies by producer).
fn meta_lookup<'a>(meta: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    meta?
        .as_object()?
        .values()
        .find_map(|entry| entry.get(key))
}

fn meta_str(meta: Option<&Value>, key: &str) -> String {
    meta_lookup(meta, key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Numbers arrive either as JSON numbers or as formatted strings.
fn meta_f64(meta: Option<&Value>, key: &str) -> f64 {
    match meta_lookup(meta, key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn location_share_json(location: &LocationData) -> String {
    serde_json::json!({
        "app": "com.tencent.map",
        "desc": "Map",
        "view": "LocationShare",
        "ver": "0.0.0.1",
        "prompt": format!("[Location]{}", location.name),
        "from": 1,
        "meta": {
            "Location.Search": {
                "id": "12250896297164027526",
                "name": location.name,
                "address": location.address,
                "lat": format!("{:.5}", location.latitude),
                "lng": format!("{:.5}", location.longitude),
                "from": "plusPanel"
            }
        },
        "config": { "forward": 1, "autosize": 1, "type": "card" }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event(json: Value) -> OnebotEvent {
        match parse_payload(json).unwrap() {
            Payload::Event(event) => event,
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn event_key_group_message() {
        let event = message_event(serde_json::json!({
            "post_type": "message", "message_type": "group",
            "group_id": 7, "user_id": 3, "message": [], "sender": {"user_id": 3}
        }));
        assert_eq!(event_key(&event), "7");
    }

    #[test]
    fn event_key_private_message_uses_sender() {
        let event = message_event(serde_json::json!({
            "post_type": "message", "message_type": "private",
            "user_id": 3, "message": [], "sender": {"user_id": 3}
        }));
        assert_eq!(event_key(&event), "3");
    }

    #[test]
    fn event_key_self_sent_uses_target() {
        let event = message_event(serde_json::json!({
            "post_type": "message_sent", "message_type": "private",
            "user_id": 1000, "target_id": 2000, "message": [],
            "sender": {"user_id": 1000}
        }));
        assert_eq!(event_key(&event), "2000");
    }

    #[test]
    fn location_share_decodes() {
        let content = serde_json::json!({
            "view": "LocationShare",
            "meta": {
                "Location.Search": {
                    "name": "Cafe", "address": "1 Main St",
                    "lat": "31.23040", "lng": "121.47370"
                }
            }
        })
        .to_string();

        let (kind, data) = decode_json_segment(&content).unwrap();
        assert_eq!(kind, EventKind::Location);
        match data {
            EventData::Location(location) => {
                assert_eq!(location.name, "Cafe");
                assert!((location.latitude - 31.2304).abs() < 1e-6);
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn qqdocurl_becomes_app_card() {
        let content = serde_json::json!({
            "prompt": "[File] notes.docx",
            "meta": {
                "music": {
                    "title": "Docs", "desc": "shared document",
                    "qqdocurl": "https://docs.qq.com/x"
                }
            }
        })
        .to_string();

        let (kind, data) = decode_json_segment(&content).unwrap();
        assert_eq!(kind, EventKind::App);
        match data {
            EventData::App(app) => {
                assert_eq!(app.title, "[File] notes.docx");
                assert_eq!(app.source, "Docs");
                assert_eq!(app.url, "https://docs.qq.com/x");
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn jump_url_becomes_app_card() {
        let content = serde_json::json!({
            "prompt": "[Share] article",
            "meta": {
                "news": {
                    "desc": "an article", "tag": "NewsApp",
                    "jumpUrl": "https://example.com/a"
                }
            }
        })
        .to_string();

        let (kind, data) = decode_json_segment(&content).unwrap();
        assert_eq!(kind, EventKind::App);
        match data {
            EventData::App(app) => {
                assert_eq!(app.source, "NewsApp");
                assert_eq!(app.url, "https://example.com/a");
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn plain_json_segment_is_ignored() {
        assert!(decode_json_segment("{\"foo\": 1}").is_none());
        assert!(decode_json_segment("not json").is_none());
    }

    #[test]
    fn location_share_round_trips_through_decoder() {
        let location = LocationData {
            name: "Cafe".into(),
            address: "1 Main St".into(),
            latitude: 31.2304,
            longitude: 121.4737,
        };
        let (kind, data) = decode_json_segment(&location_share_json(&location)).unwrap();
        assert_eq!(kind, EventKind::Location);
        match data {
            EventData::Location(decoded) => {
                assert_eq!(decoded.name, "Cafe");
                assert_eq!(decoded.address, "1 Main St");
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn inline_binary_uses_base64_scheme() {
        let blob = BlobData {
            name: "a.png".into(),
            mime: "image/png".into(),
            binary: b"hi".to_vec(),
        };
        assert_eq!(inline_binary(&blob), "base64://aGk=");
    }
}
