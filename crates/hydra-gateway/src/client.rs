//! The vendor client contract and the service-side registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use hydra_core::bus::EventSink;
use hydra_core::types::{Event, EventKind};
use hydra_core::BridgeError;

/// Close payload sent to adapters when the service shuts down: a
/// limb-protocol disconnect request.
pub const GOODBYE_CLOSE: &str = r#"{"type":0,"data":{"type":0,"data":"server_shutting_down"}}"#;

/// A vendor client bound to one WebSocket connection.
#[async_trait]
pub trait Client: Send + Sync {
    /// Stable identifier, also the registry key.
    fn vendor(&self) -> String;

    /// Send an outbound event and wait for the far side's acknowledgement.
    /// The returned event carries the vendor-assigned id and timestamp.
    async fn send_event(&self, event: &Event) -> Result<Event, BridgeError>;

    /// Send the goodbye close frame and drop the socket.
    async fn dispose(&self);
}

/// Clients by vendor string. Entries are added on upgrade and removed when
/// the read loop exits.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<dyn Client>>>,
    /// Sink of the slave→master bus, used for observe notices.
    s2m: EventSink,
}

impl ClientRegistry {
    pub fn new(s2m: EventSink) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            s2m,
        }
    }

    pub fn insert(&self, vendor: String, client: Arc<dyn Client>) {
        self.clients.lock().unwrap().insert(vendor, client);
    }

    pub fn remove(&self, vendor: &str) {
        self.clients.lock().unwrap().remove(vendor);
    }

    pub fn get(&self, vendor: &str) -> Option<Arc<dyn Client>> {
        self.clients.lock().unwrap().get(vendor).cloned()
    }

    /// Notify the admin through the s→m bus.
    pub fn observe(&self, message: String) {
        let sink = self.s2m.clone();
        tokio::spawn(async move {
            let mut event = Event::default();
            event.kind = EventKind::Observe;
            event.content = message;
            if sink.send(event).await.is_err() {
                warn!("slave→master bus is closed");
            }
        });
    }

    /// Dispose every registered client (shutdown path).
    pub async fn dispose_all(&self) {
        let clients: Vec<Arc<dyn Client>> = self.clients.lock().unwrap().values().cloned().collect();
        for client in clients {
            client.dispose().await;
        }
    }
}
