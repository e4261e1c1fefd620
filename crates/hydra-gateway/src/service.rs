//! The vendor-side service: WebSocket server lifecycle plus the
//! master→slave dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hydra_core::bus::{EventSink, EventSource};
use hydra_core::config::BridgeConfig;
use hydra_core::mutex::KeyMutex;
use hydra_core::types::Event;
use hydra_core::BridgeError;

use crate::app::{self, AppState};
use crate::client::Client;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

pub struct LimbService {
    state: Arc<AppState>,
    mutex: Arc<KeyMutex>,
    server: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LimbService {
    pub fn new(config: BridgeConfig, s2m: EventSink) -> Self {
        Self {
            state: Arc::new(AppState::new(config, s2m)),
            mutex: Arc::new(KeyMutex::with_locks(47)),
            server: None,
            shutdown: None,
        }
    }

    /// Bind the listener and spawn the server plus the dispatch loop.
    pub async fn start(&mut self, m2s: EventSource) -> anyhow::Result<()> {
        let addr = self.state.config.service.addr.clone();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "LimbService listening");

        let router = app::build_router(Arc::clone(&self.state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.server = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "server error");
            }
        }));

        tokio::spawn(dispatch(
            Arc::clone(&self.state),
            Arc::clone(&self.mutex),
            m2s,
        ));
        Ok(())
    }

    /// Dispose every client, then give the server a bounded window to drain.
    pub async fn stop(&mut self) {
        info!("LimbService stopping");
        self.state.registry.dispose_all().await;

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            if tokio::time::timeout(SHUTDOWN_DEADLINE, server).await.is_err() {
                warn!("server shutdown deadline exceeded");
            }
        }
    }
}

/// Master→slave dispatch: each event goes to its vendor's client under the
/// per-chat mutex. Events for unattached vendors fail through the callback.
async fn dispatch(state: Arc<AppState>, mutex: Arc<KeyMutex>, mut source: EventSource) {
    while let Some(mut event) = source.recv().await {
        let vendor = event.vendor.to_string();
        match state.registry.get(&vendor) {
            Some(client) => {
                let mutex = Arc::clone(&mutex);
                tokio::spawn(async move {
                    let key = event.chat.id.clone();
                    let _guard = mutex.lock(&key).await;
                    deliver(client, event).await;
                });
            }
            None => event.resolve(Err(BridgeError::ClientNotFound(vendor))),
        }
    }
}

/// Send one event and settle its callback: ack identity on success, a
/// composed error otherwise. The callback fires exactly once either way.
async fn deliver(client: Arc<dyn Client>, mut event: Event) {
    match client.send_event(&event).await {
        Ok(ack) => {
            event.id = ack.id;
            event.timestamp = ack.timestamp;
            if let Some(callback) = event.callback.take() {
                callback(Ok(event));
            }
        }
        Err(e) => {
            let error =
                BridgeError::Internal(format!("failed to send event to {}: {e}", client.vendor()));
            event.resolve(Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use hydra_core::types::Vendor;

    use super::*;

    struct MockClient {
        fail: bool,
    }

    #[async_trait]
    impl Client for MockClient {
        fn vendor(&self) -> String {
            "qq;9999".to_string()
        }

        async fn send_event(&self, event: &Event) -> Result<Event, BridgeError> {
            if self.fail {
                Err(BridgeError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(Event::new(event.vendor.clone(), "555", 1_700_000_000))
            }
        }

        async fn dispose(&self) {}
    }

    fn outbound_event(calls: Arc<AtomicUsize>, sink: tokio::sync::mpsc::Sender<Result<Event, BridgeError>>) -> Event {
        let mut event = Event::new(Vendor::new("qq", "9999"), "100", 1);
        event.content = "hello".to_string();
        event.callback = Some(Box::new(move |result| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = sink.try_send(result);
        }));
        event
    }

    #[tokio::test]
    async fn ack_identity_flows_into_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let event = outbound_event(Arc::clone(&calls), tx);

        deliver(Arc::new(MockClient { fail: false }), event).await;

        let result = rx.recv().await.unwrap();
        let ack = result.unwrap();
        assert_eq!(ack.id, "555");
        assert_eq!(ack.timestamp, 1_700_000_000);
        assert_eq!(ack.content, "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_failure_reaches_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let event = outbound_event(Arc::clone(&calls), tx);

        deliver(Arc::new(MockClient { fail: true }), event).await;

        let result = rx.recv().await.unwrap();
        let error = result.unwrap_err();
        assert!(error.to_string().contains("failed to send event to qq;9999"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
