//! Extgate Nexus — shared store access for the gateway and its plugins
//!
//! Exposes exactly two primitives, `execute` and `query`. Plugins receive a
//! [`Nexus`] handle through their context object and never see a raw
//! connection.

pub mod store;
pub mod value;

pub use store::{Nexus, RetryPolicy};
pub use value::Row;
