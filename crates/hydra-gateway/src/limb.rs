//! Limb-protocol client: the envelope request/response multiplexer over one
//! WebSocket connection.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use hydra_core::bus::EventSink;
use hydra_core::protocol::{ResponseBody, WireBody, WireMessage, WireRequest, WireResponse};
use hydra_core::types::Event;
use hydra_core::BridgeError;

use crate::client::{Client, GOODBYE_CLOSE};

const CLOSE_DEADLINE: Duration = Duration::from_secs(3);

pub struct LimbClient {
    vendor: String,
    send_timeout: Duration,
    /// Writes are serialized behind this lock.
    writer: Mutex<SplitSink<WebSocket, Message>>,
    /// Sink of the slave→master bus.
    out: EventSink,
    /// Pending single-shot response waiters, keyed by correlation id.
    waiters: DashMap<i64, oneshot::Sender<WireResponse>>,
    request_id: AtomicI64,
}

impl LimbClient {
    pub fn new(
        vendor: String,
        send_timeout: Duration,
        writer: SplitSink<WebSocket, Message>,
        out: EventSink,
    ) -> Self {
        Self {
            vendor,
            send_timeout,
            writer: Mutex::new(writer),
            out,
            waiters: DashMap::new(),
            request_id: AtomicI64::new(0),
        }
    }

    /// Read frames until error, EOF, or peer close. Pending waiters are not
    /// failed here; they run into their own timeouts.
    pub async fn run(&self, mut reader: SplitStream<WebSocket>) {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&text).await,
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

    async fn handle_frame(&self, text: &str) {
        let message: WireMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(vendor = %self.vendor, error = %e, "malformed frame, ignoring");
                return;
            }
        };

        match message.body {
            WireBody::Request(WireRequest::Ping) => debug!(vendor = %self.vendor, "ping request"),
            WireBody::Request(WireRequest::Disconnect) => {
                debug!(vendor = %self.vendor, "disconnect request")
            }
            WireBody::Request(WireRequest::Event(event)) => {
                if self.out.send(*event).await.is_err() {
                    warn!("slave→master bus is closed");
                }
            }
            WireBody::Response(response) => self.deliver(message.id, response),
        }
    }

    /// Hand a response to its waiter. Late responses (waiter timed out and
    /// was removed) are dropped with a warning.
    fn deliver(&self, id: i64, response: WireResponse) {
        match self.waiters.remove(&id) {
            Some((_, waiter)) => {
                if waiter.send(response).is_err() {
                    warn!(id, "response waiter is gone");
                }
            }
            None => warn!(id, "dropping response to unknown request id"),
        }
    }

    async fn request(&self, request: WireRequest) -> Result<WireResponse, BridgeError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.waiters.insert(id, waiter_tx);

        debug!(vendor = %self.vendor, id, "sending request");
        if let Err(e) = self.write(&WireMessage::request(id, request)).await {
            self.waiters.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.send_timeout, waiter_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.waiters.remove(&id);
                Err(BridgeError::WebsocketClosed)
            }
            Err(_) => {
                self.waiters.remove(&id);
                Err(BridgeError::Timeout(self.send_timeout))
            }
        }
    }

    async fn write(&self, message: &WireMessage) -> Result<(), BridgeError> {
        let json = serde_json::to_string(message)?;
        let mut writer = self.writer.lock().await;
        tokio::time::timeout(self.send_timeout, writer.send(Message::Text(json.into())))
            .await
            .map_err(|_| BridgeError::Timeout(self.send_timeout))?
            .map_err(|_| BridgeError::WebsocketNotConnected)
    }
}

#[async_trait]
impl Client for LimbClient {
    fn vendor(&self) -> String {
        self.vendor.clone()
    }

    async fn send_event(&self, event: &Event) -> Result<Event, BridgeError> {
        let response = self
            .request(WireRequest::Event(Box::new(event.clone_payload())))
            .await?;

        if let Some(error) = response.error {
            return Err(BridgeError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        match response.body {
            ResponseBody::Event(ack) => Ok(*ack),
            ResponseBody::Closed => Err(BridgeError::WebsocketClosed),
            ResponseBody::Ping => Err(BridgeError::UnsupportedResponse("ping".to_string())),
        }
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
