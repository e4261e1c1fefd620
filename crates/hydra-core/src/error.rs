use std::time::Duration;

use thiserror::Error;

/// Errors that travel with events across the bridge (callback results,
/// send failures, routing misses).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("vendor address invalid: {0}")]
    InvalidVendor(String),

    #[error("limb address invalid: {0}")]
    InvalidLimb(String),

    #[error("websocket not connected")]
    WebsocketNotConnected,

    #[error("websocket closed before response received")]
    WebsocketClosed,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Error body relayed from the far side of a vendor connection.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("client {0} not found")]
    ClientNotFound(String),

    #[error("response {0} not supported")]
    UnsupportedResponse(String),

    #[error("event {0} not supported")]
    UnsupportedEvent(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Short code string used in wire error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "CONFIG_ERROR",
            BridgeError::InvalidVendor(_) | BridgeError::InvalidLimb(_) => "ADDRESS_INVALID",
            BridgeError::WebsocketNotConnected => "WS_NOT_CONNECTED",
            BridgeError::WebsocketClosed => "WS_CLOSED",
            BridgeError::Timeout(_) => "TIMEOUT",
            BridgeError::Remote { .. } => "REMOTE_ERROR",
            BridgeError::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            BridgeError::UnsupportedResponse(_) => "RESPONSE_UNSUPPORTED",
            BridgeError::UnsupportedEvent(_) => "EVENT_UNSUPPORTED",
            BridgeError::Serialization(_) => "SERIALIZATION_ERROR",
            BridgeError::Io(_) => "IO_ERROR",
            BridgeError::Database(_) => "DATABASE_ERROR",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
