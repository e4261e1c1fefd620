use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("store error: {0}")]
    Store(#[from] hydra_store::StoreError),

    #[error("bridge error: {0}")]
    Bridge(#[from] hydra_core::BridgeError),

    #[error("{0} not found")]
    ChatUnknown(String),

    #[error("message type not supported")]
    UnsupportedMessage,

    #[error("download error: {0}")]
    Download(String),
}
