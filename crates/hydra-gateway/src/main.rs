//! Process entry point: wire the Telegram master, the two event buses, and
//! the vendor-side WebSocket service together, then wait for a signal.

use std::sync::Arc;

use tracing::info;

use hydra_core::bus;
use hydra_core::config::BridgeConfig;
use hydra_master::MasterService;
use hydra_store::Store;

mod app;
mod client;
mod filter;
mod limb;
mod onebot;
mod service;

use service::LimbService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("HYDRA_CONFIG").ok();
    let config = BridgeConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    let store = Arc::new(Store::open("master.db")?);

    let (m2s_sink, m2s_source) = bus::channel(bus::DEFAULT_CAPACITY, filter::master_to_slave());
    let (s2m_sink, s2m_source) = bus::channel(bus::DEFAULT_CAPACITY, filter::slave_to_master());

    let mut master = MasterService::new(
        config.clone(),
        Arc::clone(&store),
        s2m_source,
        m2s_sink.clone(),
    )?;
    master.start();

    let mut service = LimbService::new(config, s2m_sink.clone());
    service.start(m2s_source).await?;

    wait_for_shutdown().await;
    info!("shutting down");

    service.stop().await;
    master.stop().await;
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
