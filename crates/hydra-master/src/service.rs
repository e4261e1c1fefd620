use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use tracing::{info, warn};

use hydra_core::bus::{EventSink, EventSource};
use hydra_core::config::{BridgeConfig, DEFAULT_API_URL};
use hydra_core::mutex::KeyMutex;
use hydra_core::types::{Limb, Vendor};
use hydra_store::Store;

use crate::callback::CallbackMap;
use crate::error::MasterError;

pub(crate) const MASTER_VENDOR: &str = "telegram";

/// Shared state for all handler invocations and the outbound loop.
pub(crate) struct MasterContext {
    pub config: BridgeConfig,
    pub bot: Bot,
    pub store: Arc<Store>,
    /// Sink of the master→slave bus.
    pub out: EventSink,
    /// `vendor string → archive supergroup chat id`.
    pub archive_chats: HashMap<String, i64>,
    pub callbacks: CallbackMap,
    pub mutex: KeyMutex,
    /// Master chats where topic creation failed because the chat is not a
    /// forum; kept to avoid re-probing on every message.
    pub non_forum: DashSet<i64>,
}

impl MasterContext {
    /// The master-side limb for a Telegram chat the admin acts in.
    pub fn master_limb(&self, chat_id: ChatId) -> String {
        Limb::new(
            MASTER_VENDOR,
            self.config.master.admin_id.to_string(),
            chat_id.0.to_string(),
        )
        .to_string()
    }
}

/// The Telegram master service: polling dispatcher plus the slave→master
/// rendering loop.
pub struct MasterService {
    ctx: Arc<MasterContext>,
    source: Option<EventSource>,
    shutdown: Option<ShutdownToken>,
}

impl MasterService {
    pub fn new(
        config: BridgeConfig,
        store: Arc<Store>,
        source: EventSource,
        out: EventSink,
    ) -> Result<Self, MasterError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &config.master.proxy {
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).map_err(|e| MasterError::Config(e.to_string()))?);
        }
        let client = builder
            .build()
            .map_err(|e| MasterError::Config(e.to_string()))?;

        let mut bot = Bot::with_client(&config.master.token, client);
        if config.master.api_url != DEFAULT_API_URL {
            let api_url = url::Url::parse(&config.master.api_url)
                .map_err(|e| MasterError::Config(e.to_string()))?;
            bot = bot.set_api_url(api_url);
        }

        let archive_chats = config
            .master
            .archive
            .iter()
            .map(|archive| {
                (
                    Vendor::new(archive.vendor.clone(), archive.uid.clone()).to_string(),
                    archive.chat_id,
                )
            })
            .collect();

        Ok(Self {
            ctx: Arc::new(MasterContext {
                config,
                bot,
                store,
                out,
                archive_chats,
                callbacks: CallbackMap::new(),
                mutex: KeyMutex::with_locks(47),
                non_forum: DashSet::new(),
            }),
            source: Some(source),
            shutdown: None,
        })
    }

    /// Spawn the update dispatcher and the slave→master loop.
    pub fn start(&mut self) {
        info!("MasterService starting");

        if let Some(source) = self.source.take() {
            tokio::spawn(crate::outbound::run(Arc::clone(&self.ctx), source));
        }

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(crate::handler::on_message))
            .branch(Update::filter_callback_query().endpoint(crate::handler::on_callback));

        let mut dispatcher = Dispatcher::builder(self.ctx.bot.clone(), handler)
            .dependencies(dptree::deps![Arc::clone(&self.ctx)])
            .default_handler(|_update| async {})
            .build();
        self.shutdown = Some(dispatcher.shutdown_token());

        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });
    }

    /// Halt polling. Already-running handlers finish on their own.
    pub async fn stop(&mut self) {
        info!("MasterService stopping");
        if let Some(token) = self.shutdown.take() {
            match token.shutdown() {
                Ok(wait) => wait.await,
                Err(e) => warn!(error = %e, "dispatcher was not running"),
            }
        }
    }
}
