//! Core model for the Hydra bridge: the unified event envelope, the limb
//! wire protocol, the filtered event bus, and the shared runtime plumbing
//! (config, errors, key mutex, media sniffing).

pub mod bus;
pub mod config;
pub mod error;
pub mod media;
pub mod mutex;
pub mod protocol;
pub mod types;

pub use error::{BridgeError, Result};
