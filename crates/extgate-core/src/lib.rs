//! Extgate Core - Types, configuration, and error handling

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::*;
pub use error::{ErrorEnvelope, ErrorKind, GatewayError, Result};
pub use protocol::*;
pub use types::*;
